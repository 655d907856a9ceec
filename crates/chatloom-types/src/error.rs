use thiserror::Error;

/// Errors surfaced by the chat facade to its caller.
///
/// Generation failures are never reported here; they become transcript
/// state instead.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid or missing API key")]
    CredentialInvalid,

    #[error("no active session")]
    NoActiveSession,

    #[error("session not found")]
    SessionNotFound,

    #[error("a response is already being generated")]
    GenerationInProgress,

    #[error("message is empty")]
    EmptyMessage,

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

/// Errors from encoding or decoding durable session data.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid session data: {0}")]
    Invalid(String),

    #[error("failed to encode session data: {0}")]
    Encode(String),
}

/// Errors from the image-generation collaborator.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("image service unavailable: {0}")]
    Unavailable(String),
}

/// Errors from repository operations (used by trait definitions in chatloom-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

//! Classification of backend failures into user-facing outcomes.

use chatloom_types::event::FailureKind;
use chatloom_types::llm::LlmError;

/// Advisory shown while the credential is out of quota.
pub const QUOTA_ADVISORY: &str =
    "Your API key has exceeded its quota limit. Please wait a few minutes or use a different API key.";

const QUOTA_MESSAGE: &str =
    "API quota exceeded. Please try again in a few minutes or change your API key.";

const CREDENTIAL_MESSAGE: &str = "Your API key was rejected. Please change your API key.";

/// Markers the backend uses in error text when a quota is exhausted.
const QUOTA_MARKERS: [&str; 3] = ["429", "quota", "resource_exhausted"];

/// How a failed generation is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The backend rejected the credential.
    CredentialInvalid,
    /// The credential is out of quota. Raises the advisory.
    QuotaExceeded,
    /// Anything else; the raw error text is shown.
    Transient,
}

impl ErrorClass {
    /// Classify a backend error.
    ///
    /// Rate limiting is always a quota failure. Other variants are matched
    /// on their text, since quota exhaustion is sometimes reported as a
    /// generic provider error.
    pub fn classify(error: &LlmError) -> Self {
        match error {
            LlmError::AuthenticationFailed => ErrorClass::CredentialInvalid,
            LlmError::RateLimited { .. } => ErrorClass::QuotaExceeded,
            other => {
                let text = other.to_string().to_lowercase();
                if QUOTA_MARKERS.iter().any(|marker| text.contains(marker)) {
                    ErrorClass::QuotaExceeded
                } else {
                    ErrorClass::Transient
                }
            }
        }
    }

    /// Text written into the failed assistant message.
    pub fn user_message(&self, error: &LlmError) -> String {
        match self {
            ErrorClass::CredentialInvalid => CREDENTIAL_MESSAGE.to_string(),
            ErrorClass::QuotaExceeded => QUOTA_MESSAGE.to_string(),
            ErrorClass::Transient => format!("Sorry, something went wrong. {error}"),
        }
    }

    pub fn raises_advisory(&self) -> bool {
        matches!(self, ErrorClass::QuotaExceeded)
    }

    /// The kind reported with the generation's terminal event.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ErrorClass::CredentialInvalid => FailureKind::Credential,
            ErrorClass::QuotaExceeded => FailureKind::Quota,
            ErrorClass::Transient => FailureKind::Transient,
        }
    }
}

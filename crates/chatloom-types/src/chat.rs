//! Chat session and message types for Chatloom.
//!
//! These types model conversations between a user and the generative
//! backend: the visible transcript (`ChatMessage`), its attachments, and the
//! durable `SessionRecord` form that is written to storage.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Title every session starts with until a real title is derived.
pub const PLACEHOLDER_TITLE: &str = "New Chat";

/// Unique identifier for a chat session, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new SessionId using UUID v7 (timestamp-derived, ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a SessionId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Who authored a message in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "ai")]
    Assistant,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "ai"),
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Sender::User),
            "ai" | "assistant" => Ok(Sender::Assistant),
            other => Err(format!("invalid sender: '{other}'")),
        }
    }
}

/// An image the user attached to a message (base64 payload + media type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

/// Reference to an image produced by the image-generation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
    pub prompt: String,
    /// Tag of the model/service that produced the image.
    pub model: String,
}

/// A single entry in a session transcript.
///
/// User messages never change after creation. Assistant messages are
/// mutated in place only while `is_loading` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,
    pub sender: Sender,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_image: Option<GeneratedImage>,
    #[serde(default)]
    pub is_loading: bool,
    #[serde(default)]
    pub is_error: bool,
    /// Marks both halves of an image-generation exchange. Such messages are
    /// shown in the transcript but never replayed to the text backend.
    #[serde(default)]
    pub is_image_generation: bool,
}

impl ChatMessage {
    /// A user turn with optional image attachment.
    pub fn user(text: impl Into<String>, image: Option<ImageAttachment>) -> Self {
        Self {
            id: Uuid::now_v7(),
            sender: Sender::User,
            text: text.into(),
            image,
            generated_image: None,
            is_loading: false,
            is_error: false,
            is_image_generation: false,
        }
    }

    /// An empty assistant message awaiting streamed content.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: Uuid::now_v7(),
            sender: Sender::Assistant,
            text: String::new(),
            image: None,
            generated_image: None,
            is_loading: true,
            is_error: false,
            is_image_generation: false,
        }
    }

    /// Mark this message as part of an image-generation exchange.
    pub fn into_image_generation(mut self) -> Self {
        self.is_image_generation = true;
        self
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }

    pub fn is_assistant(&self) -> bool {
        self.sender == Sender::Assistant
    }

    /// Whether this message may be replayed as a backend conversation turn.
    ///
    /// Error messages, image-generation messages and unfinished messages are
    /// not valid backend turns.
    pub fn is_replayable(&self) -> bool {
        !self.is_error && !self.is_image_generation && !self.is_loading
    }
}

/// Durable form of a session: everything except the live backend handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub title: String,
    /// Whether the title has already been derived. Records written before
    /// this flag existed infer it from the title.
    #[serde(default)]
    pub titled: Option<bool>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl SessionRecord {
    /// Resolve the title gate, inferring it for records that lack the flag.
    pub fn is_titled(&self) -> bool {
        self.titled.unwrap_or(self.title != PLACEHOLDER_TITLE)
    }
}

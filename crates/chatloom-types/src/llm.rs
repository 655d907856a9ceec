//! LLM request/response types for Chatloom.
//!
//! These types model the data shapes for generative backend interactions:
//! conversation turns made of parts, completion requests, streaming events,
//! and error handling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a turn in a backend conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentRole {
    User,
    Model,
}

impl fmt::Display for ContentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentRole::User => write!(f, "user"),
            ContentRole::Model => write!(f, "model"),
        }
    }
}

impl FromStr for ContentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(ContentRole::User),
            "model" => Ok(ContentRole::Model),
            other => Err(format!("invalid content role: '{other}'")),
        }
    }
}

/// One part of a conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    InlineData { mime_type: String, data: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline_data(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Part::InlineData {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// A single turn in a backend conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub role: ContentRole,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: ContentRole::User,
            parts,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ContentRole::Model,
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                Part::InlineData { .. } => None,
            })
            .collect()
    }
}

/// Server-side tools the backend may use while answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    /// Search-augmented grounding.
    GoogleSearch,
}

/// Request to an LLM provider for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    /// A single-turn, non-streaming text request.
    pub fn one_shot(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            contents: vec![Content::user(vec![Part::text(prompt)])],
            tools: Vec::new(),
            max_output_tokens: None,
            temperature: None,
            stream: false,
        }
    }
}

/// Response from an LLM provider for a non-streaming completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

/// Token usage for a completion request/response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Events emitted during a streaming LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of generated text.
    TextDelta { text: String },

    /// Token usage information.
    Usage(Usage),

    /// The backend reported why it stopped.
    Finished { reason: String },

    /// The stream has completed.
    Done,
}

/// Errors from LLM provider operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("provider overloaded: {0}")]
    Overloaded(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Capabilities of an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub streaming: bool,
    pub vision: bool,
    pub search_grounding: bool,
    pub max_context_tokens: u32,
    pub max_output_tokens: u32,
}

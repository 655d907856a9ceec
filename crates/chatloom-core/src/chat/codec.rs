//! Conversion between live sessions and their durable records.
//!
//! The live `Conversation` handle is never serialized. On restore it is
//! rebuilt by replaying the transcript into backend turns.

use std::collections::HashSet;
use std::sync::Arc;

use chatloom_types::chat::{ChatMessage, SessionRecord};
use chatloom_types::error::CodecError;
use chatloom_types::llm::{Content, Part};
use tracing::warn;

use super::conversation::Conversation;
use super::session::ChatSession;
use crate::llm::box_provider::BoxLlmProvider;

/// Builds conversations for the configured model and converts sessions to
/// and from [`SessionRecord`]s.
#[derive(Debug, Clone)]
pub struct PersistenceCodec {
    provider: Arc<BoxLlmProvider>,
    model: String,
}

impl PersistenceCodec {
    pub fn new(provider: Arc<BoxLlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// A fresh conversation seeded with `history`.
    pub fn conversation(&self, history: Vec<Content>) -> Conversation {
        Conversation::new(Arc::clone(&self.provider), self.model.clone(), history)
    }

    /// Durable form of a session.
    pub fn to_record(session: &ChatSession) -> SessionRecord {
        SessionRecord {
            id: session.id,
            title: session.title.clone(),
            titled: Some(session.titled),
            messages: session.messages.clone(),
        }
    }

    /// Rebuild a live session from its record.
    ///
    /// Assistant messages still marked loading belong to a generation that
    /// died with the previous process and are dropped.
    pub fn restore(&self, record: SessionRecord) -> ChatSession {
        let titled = record.is_titled();
        let messages: Vec<ChatMessage> = record
            .messages
            .into_iter()
            .filter(|m| !m.is_loading)
            .collect();
        let conversation = self.conversation(Self::replay_history(&messages));
        ChatSession {
            id: record.id,
            title: record.title,
            titled,
            messages,
            conversation,
        }
    }

    /// Backend turns equivalent to a transcript.
    ///
    /// Error, image-generation and unfinished messages are skipped, as are
    /// messages that would produce a turn with no parts.
    pub fn replay_history(messages: &[ChatMessage]) -> Vec<Content> {
        messages
            .iter()
            .filter(|m| m.is_replayable())
            .filter_map(|m| {
                if m.is_user() {
                    let parts = Self::user_parts(m);
                    (!parts.is_empty()).then(|| Content::user(parts))
                } else {
                    (!m.text.is_empty()).then(|| Content::model(m.text.clone()))
                }
            })
            .collect()
    }

    /// Parts sent for a user message: the attached image first, then text.
    pub fn user_parts(message: &ChatMessage) -> Vec<Part> {
        let mut parts = Vec::with_capacity(2);
        if let Some(image) = &message.image {
            parts.push(Part::inline_data(image.mime_type.clone(), image.data.clone()));
        }
        if !message.text.is_empty() {
            parts.push(Part::text(message.text.clone()));
        }
        parts
    }

    /// Serialize the ordered session list.
    pub fn encode(records: &[SessionRecord]) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(records).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Parse a stored session list.
    ///
    /// Fails only when the payload is not a JSON array. Individual records
    /// that do not parse, or repeat an earlier id, are skipped.
    pub fn decode(bytes: &[u8]) -> Result<Vec<SessionRecord>, CodecError> {
        let values: Vec<serde_json::Value> =
            serde_json::from_slice(bytes).map_err(|e| CodecError::Invalid(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<SessionRecord>(value) {
                Ok(record) if seen.insert(record.id) => records.push(record),
                Ok(record) => {
                    warn!(index, session_id = %record.id, "skipping duplicate session record");
                }
                Err(e) => {
                    warn!(index, error = %e, "skipping unreadable session record");
                }
            }
        }
        Ok(records)
    }
}

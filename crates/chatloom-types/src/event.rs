//! Event types for the Chatloom session event bus.
//!
//! `SessionEvent` is broadcast whenever visible session state changes so a
//! consuming UI can re-render. All variants are Clone + Send + Sync for use
//! with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::SessionId;

/// Events emitted while sessions are mutated and responses stream in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session list or the active session changed.
    SessionsChanged { active: Option<SessionId> },

    /// Buffered text was flushed into the trailing assistant message.
    ///
    /// `text` is the full text accumulated so far, never a delta.
    MessageFlushed {
        session_id: SessionId,
        message_id: Uuid,
        text: String,
    },

    /// A generation reached a terminal state.
    GenerationFinished {
        session_id: SessionId,
        message_id: Uuid,
        outcome: GenerationOutcome,
    },

    /// A session received a new title.
    TitleChanged { session_id: SessionId, title: String },
}

/// Terminal state of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationOutcome {
    Completed,
    Cancelled,
    Failed { kind: FailureKind },
}

/// Why a generation failed, which decides the corrective action offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The credential was rejected; retrying cannot help.
    Credential,
    Quota,
    Transient,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serde_tag() {
        let event = SessionEvent::TitleChanged {
            session_id: SessionId::new(),
            title: "Rust async".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "title_changed");
        assert_eq!(json["title"], "Rust async");
    }

    #[test]
    fn test_outcome_serde() {
        let json = serde_json::to_string(&GenerationOutcome::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");

        let failed = GenerationOutcome::Failed {
            kind: FailureKind::Credential,
        };
        let json = serde_json::to_value(failed).unwrap();
        assert_eq!(json["failed"]["kind"], "credential");
        assert_eq!(serde_json::from_value::<GenerationOutcome>(json).unwrap(), failed);
    }
}

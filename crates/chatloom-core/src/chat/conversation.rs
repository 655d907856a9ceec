//! Live backend conversation handle.
//!
//! A `Conversation` carries the backend-side history for one session and
//! produces the streaming request for each new turn. The history only grows
//! when a turn is committed, so a failed turn leaves no trace in it.

use std::sync::{Arc, Mutex, PoisonError};

use chatloom_types::llm::{CompletionRequest, Content, Part, Tool};

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::EventStream;

/// Backend-side conversation state bound to a model.
///
/// Clones share the same history, so a session snapshot and the generation
/// task working on it observe the same committed turns.
#[derive(Clone)]
pub struct Conversation {
    provider: Arc<BoxLlmProvider>,
    model: String,
    history: Arc<Mutex<Vec<Content>>>,
}

impl Conversation {
    pub fn new(provider: Arc<BoxLlmProvider>, model: impl Into<String>, history: Vec<Content>) -> Self {
        Self {
            provider,
            model: model.into(),
            history: Arc::new(Mutex::new(history)),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Snapshot of the committed history.
    pub fn history(&self) -> Vec<Content> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of committed turns (user and model turns both count).
    pub fn len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start streaming a reply to `parts` on top of the committed history.
    pub fn stream_turn(&self, parts: Vec<Part>, tools: &[Tool]) -> EventStream {
        let mut contents = self.history();
        contents.push(Content::user(parts));
        let request = CompletionRequest {
            model: self.model.clone(),
            contents,
            tools: tools.to_vec(),
            max_output_tokens: None,
            temperature: None,
            stream: true,
        };
        self.provider.stream(request)
    }

    /// Record a finished exchange so later turns see it.
    ///
    /// An empty reply is not a valid model turn, so nothing is recorded.
    pub fn commit_turn(&self, parts: Vec<Part>, reply: &str) {
        if reply.is_empty() {
            return;
        }
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(Content::user(parts));
        history.push(Content::model(reply));
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("turns", &self.len())
            .finish()
    }
}

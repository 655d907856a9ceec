//! Live chat session.
//!
//! A `ChatSession` pairs the visible transcript with the backend
//! `Conversation` that continues it. All transcript edits go through the
//! methods here so the in-flight rules hold: at most one assistant message
//! is loading, it is always the last message, and only it changes.

use chatloom_types::chat::{ChatMessage, GeneratedImage, PLACEHOLDER_TITLE, SessionId};
use uuid::Uuid;

use super::conversation::Conversation;

#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: SessionId,
    pub title: String,
    /// Set once a title has been claimed; never cleared.
    pub titled: bool,
    pub messages: Vec<ChatMessage>,
    pub conversation: Conversation,
}

impl ChatSession {
    /// An empty session with the placeholder title.
    pub fn new(conversation: Conversation) -> Self {
        Self {
            id: SessionId::new(),
            title: PLACEHOLDER_TITLE.to_string(),
            titled: false,
            messages: Vec::new(),
            conversation,
        }
    }

    /// The in-flight assistant message, if any.
    pub fn in_flight(&self) -> Option<&ChatMessage> {
        self.messages.last().filter(|m| m.is_loading)
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight().is_some()
    }

    /// Index of the last user message.
    pub fn last_user_index(&self) -> Option<usize> {
        self.messages.iter().rposition(ChatMessage::is_user)
    }

    /// Text of the first user message, used for title derivation.
    pub fn first_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.is_user())
            .map(|m| m.text.as_str())
    }

    /// Append a user message and an empty in-flight assistant message.
    ///
    /// Returns the id of the assistant message.
    pub fn begin_exchange(&mut self, user: ChatMessage) -> Uuid {
        self.settle_in_flight();
        self.messages.push(user);
        self.push_placeholder()
    }

    /// Append an empty in-flight assistant message after the existing
    /// transcript. Returns its id.
    pub fn push_placeholder(&mut self) -> Uuid {
        let placeholder = ChatMessage::assistant_placeholder();
        let id = placeholder.id;
        self.messages.push(placeholder);
        id
    }

    /// Replace the streamed text of the in-flight message `message_id`.
    ///
    /// Returns false when that message is no longer in flight.
    pub fn set_streaming_text(&mut self, message_id: Uuid, text: &str) -> bool {
        match self.in_flight_mut(message_id) {
            Some(message) => {
                message.text = text.to_string();
                true
            }
            None => false,
        }
    }

    /// Finish the in-flight message `message_id` with its final text.
    pub fn finalize(&mut self, message_id: Uuid, text: String) -> bool {
        match self.in_flight_mut(message_id) {
            Some(message) => {
                message.text = text;
                message.is_loading = false;
                true
            }
            None => false,
        }
    }

    /// Finish the in-flight message `message_id` as an error.
    pub fn fail(&mut self, message_id: Uuid, text: String) -> bool {
        match self.in_flight_mut(message_id) {
            Some(message) => {
                message.text = text;
                message.is_loading = false;
                message.is_error = true;
                true
            }
            None => false,
        }
    }

    /// Append an image-generation request and its in-flight placeholder.
    ///
    /// Returns the id of the placeholder.
    pub fn begin_image_exchange(&mut self, prompt: &str) -> Uuid {
        self.settle_in_flight();
        self.messages
            .push(ChatMessage::user(format!("Generate image: {prompt}"), None).into_image_generation());
        let mut placeholder = ChatMessage::assistant_placeholder().into_image_generation();
        placeholder.text = "Generating your image...".to_string();
        let id = placeholder.id;
        self.messages.push(placeholder);
        id
    }

    /// Finish the image placeholder `message_id` with the generated image.
    pub fn complete_image(&mut self, message_id: Uuid, image: GeneratedImage) -> bool {
        match self.in_flight_mut(message_id) {
            Some(message) => {
                message.text = "Here's your generated image.".to_string();
                message.generated_image = Some(image);
                message.is_loading = false;
                true
            }
            None => false,
        }
    }

    /// Remove every error message from the transcript.
    pub fn prune_errors(&mut self) {
        self.messages.retain(|m| !m.is_error);
    }

    /// Drop any in-flight assistant message without a generation behind it.
    pub fn drop_in_flight(&mut self) {
        self.messages.retain(|m| !m.is_loading);
    }

    /// Claim the title slot. Returns true exactly once per session.
    pub fn claim_title(&mut self) -> bool {
        if self.titled {
            return false;
        }
        self.titled = true;
        true
    }

    /// Keep whatever text an abandoned in-flight message holds.
    fn settle_in_flight(&mut self) {
        for message in self.messages.iter_mut().filter(|m| m.is_loading) {
            message.is_loading = false;
        }
    }

    fn in_flight_mut(&mut self, message_id: Uuid) -> Option<&mut ChatMessage> {
        self.messages
            .last_mut()
            .filter(|m| m.is_loading && m.id == message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;

    fn session() -> ChatSession {
        let provider = ScriptedProvider::new();
        ChatSession::new(Conversation::new(provider.boxed(), "m", Vec::new()))
    }

    #[test]
    fn test_new_session_is_untitled_and_empty() {
        let session = session();
        assert_eq!(session.title, PLACEHOLDER_TITLE);
        assert!(!session.titled);
        assert!(session.messages.is_empty());
        assert!(!session.is_generating());
    }

    #[test]
    fn test_begin_exchange_appends_user_and_placeholder() {
        let mut session = session();
        let id = session.begin_exchange(ChatMessage::user("Hello", None));

        assert_eq!(session.messages.len(), 2);
        assert!(session.messages[0].is_user());
        let in_flight = session.in_flight().unwrap();
        assert_eq!(in_flight.id, id);
        assert!(in_flight.text.is_empty());
    }

    #[test]
    fn test_updates_only_touch_matching_in_flight_message() {
        let mut session = session();
        let id = session.begin_exchange(ChatMessage::user("Hello", None));

        assert!(session.set_streaming_text(id, "Hi"));
        assert!(!session.set_streaming_text(Uuid::now_v7(), "nope"));
        assert!(session.finalize(id, "Hi there".to_string()));
        assert!(!session.set_streaming_text(id, "late"));

        let last = session.messages.last().unwrap();
        assert_eq!(last.text, "Hi there");
        assert!(!last.is_loading);
    }

    #[test]
    fn test_fail_marks_error() {
        let mut session = session();
        let id = session.begin_exchange(ChatMessage::user("Hello", None));
        assert!(session.fail(id, "boom".to_string()));

        let last = session.messages.last().unwrap();
        assert!(last.is_error);
        assert!(!last.is_loading);
        session.prune_errors();
        assert_eq!(session.messages.len(), 1);
    }

    #[test]
    fn test_begin_exchange_settles_previous_in_flight() {
        let mut session = session();
        let first = session.begin_exchange(ChatMessage::user("one", None));
        session.set_streaming_text(first, "partial");
        session.begin_exchange(ChatMessage::user("two", None));

        let loading = session.messages.iter().filter(|m| m.is_loading).count();
        assert_eq!(loading, 1);
        assert_eq!(session.messages[1].text, "partial");
    }

    #[test]
    fn test_image_exchange() {
        let mut session = session();
        let id = session.begin_image_exchange("a red fox");

        assert_eq!(session.messages[0].text, "Generate image: a red fox");
        assert!(session.messages.iter().all(|m| m.is_image_generation));
        assert_eq!(session.in_flight().unwrap().text, "Generating your image...");

        let image = GeneratedImage {
            url: "https://example.test/fox.png".to_string(),
            prompt: "a red fox".to_string(),
            model: "test".to_string(),
        };
        assert!(session.complete_image(id, image.clone()));
        let reply = session.messages.last().unwrap();
        assert_eq!(reply.text, "Here's your generated image.");
        assert_eq!(reply.generated_image.as_ref(), Some(&image));
        assert!(!reply.is_loading);
    }

    #[test]
    fn test_claim_title_once() {
        let mut session = session();
        assert!(session.claim_title());
        assert!(!session.claim_title());
    }

    #[test]
    fn test_first_and_last_user() {
        let mut session = session();
        session.begin_exchange(ChatMessage::user("first", None));
        session.begin_exchange(ChatMessage::user("second", None));
        assert_eq!(session.first_user_text(), Some("first"));
        assert_eq!(session.last_user_index(), Some(2));
    }
}

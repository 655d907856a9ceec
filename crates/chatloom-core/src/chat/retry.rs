//! Re-running the most recent exchange of a session.
//!
//! Retry never re-appends the user message. It clears error messages,
//! rebuilds the backend conversation from the transcript that precedes the
//! user message, and streams a fresh reply into a new placeholder.

use chatloom_types::chat::{ChatMessage, SessionId};
use chatloom_types::error::ChatError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::codec::PersistenceCodec;
use super::orchestrator::StreamingOrchestrator;
use crate::storage::KvStore;

pub struct RetryCoordinator<K: KvStore> {
    orchestrator: StreamingOrchestrator<K>,
}

impl<K: KvStore> RetryCoordinator<K> {
    pub fn new(orchestrator: StreamingOrchestrator<K>) -> Self {
        Self { orchestrator }
    }

    /// Regenerate the reply to the session's most recent user message.
    ///
    /// Returns `Ok(None)` when the session has no user message to retry, or
    /// when its most recent user message is an image prompt. A failed image
    /// exchange stays in place until a new prompt is sent.
    pub async fn retry(&self, session_id: SessionId) -> Result<Option<JoinHandle<()>>, ChatError> {
        let store = self.orchestrator.store();
        let session = store.get(session_id).ok_or(ChatError::SessionNotFound)?;
        if retry_target(&session.messages).is_none() {
            debug!(session_id = %session_id, "nothing to retry");
            return Ok(None);
        }
        drop(session);

        let registration = self.orchestrator.register(session_id);
        registration.superseded_settled().await;
        let codec = store.codec().clone();
        let prepared = store
            .update(session_id, |session| {
                session.prune_errors();
                session.drop_in_flight();
                let index = retry_target(&session.messages)?;
                let parts = PersistenceCodec::user_parts(&session.messages[index]);
                session.conversation =
                    codec.conversation(PersistenceCodec::replay_history(&session.messages[..index]));
                Some((parts, session.push_placeholder()))
            })
            .await
            .flatten();

        match prepared {
            Some((parts, message_id)) => {
                info!(session_id = %session_id, "retrying last exchange");
                Ok(Some(self.orchestrator.spawn(
                    session_id,
                    registration,
                    parts,
                    message_id,
                )))
            }
            None => {
                self.orchestrator.unregister(session_id, registration.id());
                Ok(None)
            }
        }
    }
}

fn retry_target(messages: &[ChatMessage]) -> Option<usize> {
    let index = messages.iter().rposition(ChatMessage::is_user)?;
    (!messages[index].is_image_generation).then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Harness, StreamScript};
    use chatloom_types::llm::{ContentRole, LlmError};

    async fn failed_exchange(h: &Harness) -> SessionId {
        h.provider.push_stream(StreamScript::failing(
            ["Hi"],
            LlmError::Provider {
                message: "boom".to_string(),
            },
        ));
        let session = h.store.create().await;
        h.orchestrator
            .send(session.id, ChatMessage::user("Hello", None))
            .await
            .unwrap()
            .await
            .unwrap();
        session.id
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_does_not_duplicate_user_message() {
        let h = Harness::new();
        let session_id = failed_exchange(&h).await;
        let before = h.store.get(session_id).unwrap();
        assert!(before.messages[1].is_error);

        h.provider.push_stream(StreamScript::chunks(["Hi there!"]));
        let retry = RetryCoordinator::new(h.orchestrator.clone());
        retry.retry(session_id).await.unwrap().unwrap().await.unwrap();

        let after = h.store.get(session_id).unwrap();
        assert_eq!(after.messages.len(), 2);
        assert_eq!(after.messages[0].id, before.messages[0].id);
        assert_eq!(after.messages[1].text, "Hi there!");
        assert!(!after.messages[1].is_error);
        assert!(after.messages.iter().all(|m| !m.is_error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_rebuilds_conversation_from_preceding_turns() {
        let h = Harness::new();
        h.provider.push_stream(StreamScript::chunks(["first answer"]));
        let session = h.store.create().await;
        h.orchestrator
            .send(session.id, ChatMessage::user("first", None))
            .await
            .unwrap()
            .await
            .unwrap();
        h.provider.push_stream(StreamScript::failing(
            Vec::<String>::new(),
            LlmError::Stream("reset".to_string()),
        ));
        h.orchestrator
            .send(session.id, ChatMessage::user("second", None))
            .await
            .unwrap()
            .await
            .unwrap();

        h.provider.push_stream(StreamScript::chunks(["second answer"]));
        RetryCoordinator::new(h.orchestrator.clone())
            .retry(session.id)
            .await
            .unwrap()
            .unwrap()
            .await
            .unwrap();

        let requests = h.provider.stream_requests();
        let retried = requests.last().unwrap();
        let texts: Vec<String> = retried.contents.iter().map(|c| c.text()).collect();
        assert_eq!(texts, vec!["first", "first answer", "second"]);
        assert_eq!(retried.contents[2].role, ContentRole::User);

        let session = h.store.get(session.id).unwrap();
        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.conversation.len(), 4);
    }

    #[tokio::test]
    async fn test_retry_without_user_message_is_noop() {
        let h = Harness::new();
        let session = h.store.create().await;
        let retry = RetryCoordinator::new(h.orchestrator.clone());
        assert!(retry.retry(session.id).await.unwrap().is_none());
        assert!(h.store.get(session.id).unwrap().messages.is_empty());
        assert_eq!(h.orchestrator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_retry_unknown_session() {
        let h = Harness::new();
        let retry = RetryCoordinator::new(h.orchestrator.clone());
        assert!(matches!(
            retry.retry(SessionId::new()).await,
            Err(ChatError::SessionNotFound)
        ));
    }

    #[test]
    fn test_retry_target_none_after_image_prompt() {
        let mut messages = vec![
            ChatMessage::user("Hello", None),
            ChatMessage::user("Generate image: cat", None).into_image_generation(),
        ];
        assert_eq!(retry_target(&messages), None);

        messages.push(ChatMessage::user("Thanks", None));
        assert_eq!(retry_target(&messages), Some(2));
    }
}

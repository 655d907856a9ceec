//! Streaming generation lifecycle.
//!
//! `StreamingOrchestrator` runs one generation per session as a spawned
//! task: it streams the reply into the trailing assistant message through a
//! [`FlushThrottle`], honors cancellation at chunk boundaries, and settles
//! the message as complete, cancelled-complete or failed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chatloom_types::chat::{ChatMessage, SessionId};
use chatloom_types::config::ChatConfig;
use chatloom_types::error::ChatError;
use chatloom_types::event::{GenerationOutcome, SessionEvent};
use chatloom_types::llm::{LlmError, Part, StreamEvent, Tool};
use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::advisory::AdvisoryState;
use super::codec::PersistenceCodec;
use super::conversation::Conversation;
use super::store::SessionStore;
use super::throttle::{FlushThrottle, SystemClock, ThrottleOptions};
use super::title::TitleGenerator;
use crate::llm::classify::{ErrorClass, QUOTA_ADVISORY};
use crate::storage::KvStore;

/// Per-generation settings.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Minimum interval between visible flushes.
    pub window: Duration,
    /// Tools attached to every conversational turn.
    pub tools: Vec<Tool>,
}

impl StreamOptions {
    pub fn from_config(config: &ChatConfig) -> Self {
        let tools = if config.enable_search {
            vec![Tool::GoogleSearch]
        } else {
            Vec::new()
        };
        Self {
            window: Duration::from_millis(config.throttle_window_ms),
            tools,
        }
    }
}

struct ActiveGeneration {
    id: u64,
    token: CancellationToken,
    /// Cancelled once the generation has settled its message.
    settled: CancellationToken,
}

/// Ticket for a registered generation that has not started yet.
///
/// Dropping it marks the generation settled, whether or not it ran.
pub(crate) struct Registration {
    id: u64,
    token: CancellationToken,
    superseded: Option<CancellationToken>,
    _settled: DropGuard,
}

impl Registration {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Wait until the generation this one replaced has committed or failed
    /// its reply. Must complete before the transcript is touched.
    pub(crate) async fn superseded_settled(&self) {
        if let Some(settled) = &self.superseded {
            settled.cancelled().await;
        }
    }
}

struct Inner<K: KvStore> {
    store: Arc<SessionStore<K>>,
    titles: TitleGenerator,
    advisory: AdvisoryState,
    options: StreamOptions,
    generations: DashMap<SessionId, ActiveGeneration>,
    next_generation: AtomicU64,
}

/// Runs generations against sessions in a [`SessionStore`].
pub struct StreamingOrchestrator<K: KvStore> {
    inner: Arc<Inner<K>>,
}

impl<K: KvStore> Clone for StreamingOrchestrator<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: KvStore> StreamingOrchestrator<K> {
    pub fn new(
        store: Arc<SessionStore<K>>,
        titles: TitleGenerator,
        advisory: AdvisoryState,
        options: StreamOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                titles,
                advisory,
                options,
                generations: DashMap::new(),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore<K>> {
        &self.inner.store
    }

    /// Append `user_message` and an empty reply to the session, then stream
    /// the reply in a background task.
    pub async fn send(
        &self,
        session_id: SessionId,
        user_message: ChatMessage,
    ) -> Result<JoinHandle<()>, ChatError> {
        let parts = PersistenceCodec::user_parts(&user_message);
        let registration = self.register(session_id);
        registration.superseded_settled().await;
        let message_id = self
            .inner
            .store
            .update(session_id, |session| session.begin_exchange(user_message))
            .await;

        match message_id {
            Some(message_id) => Ok(self.spawn(session_id, registration, parts, message_id)),
            None => {
                self.unregister(session_id, registration.id());
                Err(ChatError::SessionNotFound)
            }
        }
    }

    /// Request cancellation of the session's generation. Idempotent.
    ///
    /// Returns false when nothing is running for the session.
    pub fn cancel(&self, session_id: SessionId) -> bool {
        match self.inner.generations.get(&session_id) {
            Some(active) => {
                active.token.cancel();
                debug!(session_id = %session_id, "generation cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every running generation.
    pub fn cancel_all(&self) {
        for active in self.inner.generations.iter() {
            active.token.cancel();
        }
    }

    pub fn is_generating(&self, session_id: SessionId) -> bool {
        self.inner.generations.contains_key(&session_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.generations.len()
    }

    /// Claim the session's generation slot, cancelling whatever held it.
    pub(crate) fn register(&self, session_id: SessionId) -> Registration {
        let id = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let settled = CancellationToken::new();
        let previous = self.inner.generations.insert(
            session_id,
            ActiveGeneration {
                id,
                token: token.clone(),
                settled: settled.clone(),
            },
        );
        let superseded = previous.map(|previous| {
            debug!(session_id = %session_id, "superseding running generation");
            previous.token.cancel();
            previous.settled
        });
        Registration {
            id,
            token,
            superseded,
            _settled: settled.drop_guard(),
        }
    }

    pub(crate) fn unregister(&self, session_id: SessionId, generation: u64) {
        self.inner
            .generations
            .remove_if(&session_id, |_, active| active.id == generation);
    }

    /// Stream a reply to `parts` into the in-flight message `message_id`.
    pub(crate) fn spawn(
        &self,
        session_id: SessionId,
        registration: Registration,
        parts: Vec<Part>,
        message_id: Uuid,
    ) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let outcome = orchestrator
                .generate(session_id, &registration.token, parts, message_id)
                .await;
            orchestrator.unregister(session_id, registration.id);
            orchestrator
                .inner
                .store
                .events()
                .publish(SessionEvent::GenerationFinished {
                    session_id,
                    message_id,
                    outcome,
                });
            drop(registration);
        })
    }

    async fn generate(
        &self,
        session_id: SessionId,
        token: &CancellationToken,
        parts: Vec<Part>,
        message_id: Uuid,
    ) -> GenerationOutcome {
        let Some(session) = self.inner.store.get(session_id) else {
            debug!(session_id = %session_id, "session removed before generation started");
            return GenerationOutcome::Cancelled;
        };
        let conversation = session.conversation.clone();
        drop(session);

        let mut stream = conversation.stream_turn(parts.clone(), &self.inner.options.tools);
        let mut throttle = FlushThrottle::new(
            SystemClock,
            ThrottleOptions::leading_trailing(self.inner.options.window),
        );
        let mut text = String::new();

        let result: Result<bool, LlmError> = loop {
            let deadline = throttle.deadline();
            tokio::select! {
                biased;
                () = token.cancelled() => break Ok(true),
                () = sleep_until(deadline) => {
                    if let Some(flushed) = throttle.poll() {
                        self.flush(session_id, message_id, &mut text, &flushed);
                    }
                }
                event = stream.next() => match event {
                    Some(Ok(StreamEvent::TextDelta { text: fragment })) => {
                        if let Some(flushed) = throttle.push(&fragment) {
                            self.flush(session_id, message_id, &mut text, &flushed);
                        }
                    }
                    Some(Ok(StreamEvent::Done)) | None => break Ok(false),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e),
                },
            }
        };
        drop(stream);

        match result {
            Ok(cancelled) => {
                if let Some(rest) = throttle.flush() {
                    text.push_str(&rest);
                }
                throttle.stop();
                self.finish(session_id, message_id, conversation, parts, text, cancelled)
                    .await
            }
            Err(error) => {
                throttle.stop();
                self.fail(session_id, message_id, error).await
            }
        }
    }

    /// Extend the visible text of the in-flight message. Not persisted.
    fn flush(&self, session_id: SessionId, message_id: Uuid, text: &mut String, flushed: &str) {
        text.push_str(flushed);
        let applied = self
            .inner
            .store
            .update_transient(session_id, |session| {
                session.set_streaming_text(message_id, text)
            })
            .unwrap_or(false);
        if applied {
            self.inner.store.events().publish(SessionEvent::MessageFlushed {
                session_id,
                message_id,
                text: text.clone(),
            });
        }
    }

    async fn finish(
        &self,
        session_id: SessionId,
        message_id: Uuid,
        conversation: Conversation,
        parts: Vec<Part>,
        text: String,
        cancelled: bool,
    ) -> GenerationOutcome {
        let finalized = self
            .inner
            .store
            .update(session_id, |session| {
                if !session.finalize(message_id, text.clone()) {
                    return None;
                }
                let title_source = if !text.is_empty() && session.claim_title() {
                    session.first_user_text().map(str::to_string)
                } else {
                    None
                };
                Some(title_source)
            })
            .await
            .flatten();

        let Some(title_source) = finalized else {
            debug!(session_id = %session_id, "reply no longer in flight, dropping result");
            return GenerationOutcome::Cancelled;
        };

        conversation.commit_turn(parts, &text);
        info!(
            session_id = %session_id,
            chars = text.len(),
            cancelled,
            "generation finished"
        );

        if let Some(first_user_text) = title_source {
            let titles = self.inner.titles.clone();
            let store = Arc::clone(&self.inner.store);
            tokio::spawn(async move {
                titles.generate(&store, session_id, &first_user_text).await;
            });
        }

        if cancelled {
            GenerationOutcome::Cancelled
        } else {
            GenerationOutcome::Completed
        }
    }

    async fn fail(&self, session_id: SessionId, message_id: Uuid, error: LlmError) -> GenerationOutcome {
        let class = ErrorClass::classify(&error);
        warn!(session_id = %session_id, error = %error, class = ?class, "generation failed");

        let message = class.user_message(&error);
        self.inner
            .store
            .update(session_id, |session| session.fail(message_id, message))
            .await;
        if class.raises_advisory() {
            self.inner.advisory.raise(QUOTA_ADVISORY);
        }
        GenerationOutcome::Failed {
            kind: class.failure_kind(),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//! Client-facing chat facade.
//!
//! `ChatService` wires the session store, orchestrator, retry coordinator
//! and title generator to one provider, and adds the rules that sit above
//! them: a single generation at a time across all sessions, image
//! exchanges, credential reset and the appearance preference.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chatloom_types::chat::{ChatMessage, ImageAttachment, SessionId};
use chatloom_types::config::{ChatConfig, Theme};
use chatloom_types::error::ChatError;
use chatloom_types::event::SessionEvent;
use chatloom_types::llm::LlmError;
use chatloom_types::storage::THEME_KEY;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chat::advisory::{Advisory, AdvisoryState};
use crate::chat::codec::PersistenceCodec;
use crate::chat::orchestrator::{StreamOptions, StreamingOrchestrator};
use crate::chat::retry::RetryCoordinator;
use crate::chat::session::ChatSession;
use crate::chat::store::SessionStore;
use crate::chat::title::TitleGenerator;
use crate::event::EventBus;
use crate::image::ImageGenerator;
use crate::llm::box_provider::BoxLlmProvider;
use crate::service::credential::{clear_credential, normalize_credential};
use crate::storage::KvStore;

/// Characters of the prompt used as title for image-only sessions.
const IMAGE_TITLE_CHARS: usize = 30;

/// Process-wide "a generation is running" flag.
#[derive(Debug, Default, Clone)]
struct GenerationGate(Arc<AtomicBool>);

/// Releases the gate when dropped.
struct GateGuard(Arc<AtomicBool>);

impl GenerationGate {
    fn try_acquire(&self) -> Option<GateGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard(Arc::clone(&self.0)))
    }

    fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChatService<K: KvStore, I: ImageGenerator> {
    kv: Arc<K>,
    store: Arc<SessionStore<K>>,
    orchestrator: StreamingOrchestrator<K>,
    retry: RetryCoordinator<K>,
    images: I,
    advisory: AdvisoryState,
    gate: GenerationGate,
}

impl<K: KvStore, I: ImageGenerator> ChatService<K, I> {
    /// Connect with `credential` and restore stored sessions.
    ///
    /// `connect` builds the provider for the trimmed credential. A blank
    /// credential, or one `connect` rejects, fails with
    /// [`ChatError::CredentialInvalid`] before any session state exists.
    pub async fn init(
        credential: &str,
        connect: impl FnOnce(&str) -> Result<BoxLlmProvider, LlmError>,
        kv: Arc<K>,
        images: I,
        config: &ChatConfig,
    ) -> Result<Self, ChatError> {
        let credential = normalize_credential(credential)?;
        let provider = connect(credential).map_err(|e| {
            warn!(error = %e, "failed to initialize provider");
            ChatError::CredentialInvalid
        })?;
        let provider = Arc::new(provider);

        let codec = PersistenceCodec::new(Arc::clone(&provider), config.model.clone());
        let store = Arc::new(SessionStore::new(Arc::clone(&kv), codec, EventBus::default()));
        let advisory = AdvisoryState::new();
        let orchestrator = StreamingOrchestrator::new(
            Arc::clone(&store),
            TitleGenerator::new(provider, config),
            advisory.clone(),
            StreamOptions::from_config(config),
        );
        let retry = RetryCoordinator::new(orchestrator.clone());

        let restored = store.load().await;
        info!(sessions = restored, model = %config.model, "chat service ready");

        Ok(Self {
            kv,
            store,
            orchestrator,
            retry,
            images,
            advisory,
            gate: GenerationGate::default(),
        })
    }

    // --- Sessions ---

    pub fn sessions(&self) -> Vec<Arc<ChatSession>> {
        self.store.list()
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<ChatSession>> {
        self.store.get(id)
    }

    pub fn active_session(&self) -> Option<Arc<ChatSession>> {
        self.store.active()
    }

    pub async fn new_chat(&self) -> Arc<ChatSession> {
        self.store.create().await
    }

    pub fn select_session(&self, id: SessionId) -> bool {
        self.store.select(id)
    }

    /// Delete a session, stopping its generation first.
    pub async fn delete_session(&self, id: SessionId) -> bool {
        self.orchestrator.cancel(id);
        self.store.delete(id).await
    }

    // --- Generation ---

    pub fn is_generating(&self) -> bool {
        self.gate.is_held()
    }

    /// Send a message to the active session and stream the reply.
    ///
    /// The returned task completes when the reply has settled.
    pub async fn send_message(
        &self,
        text: &str,
        image: Option<ImageAttachment>,
    ) -> Result<JoinHandle<()>, ChatError> {
        if text.trim().is_empty() && image.is_none() {
            return Err(ChatError::EmptyMessage);
        }
        let session_id = self.store.active_id().ok_or(ChatError::NoActiveSession)?;
        let guard = self.gate.try_acquire().ok_or(ChatError::GenerationInProgress)?;

        let handle = self
            .orchestrator
            .send(session_id, ChatMessage::user(text, image))
            .await?;
        Ok(release_after(guard, handle))
    }

    /// Regenerate the reply to the session's last user message.
    pub async fn retry(&self, session_id: SessionId) -> Result<Option<JoinHandle<()>>, ChatError> {
        let guard = self.gate.try_acquire().ok_or(ChatError::GenerationInProgress)?;
        let handle = self.retry.retry(session_id).await?;
        Ok(handle.map(|handle| release_after(guard, handle)))
    }

    /// Stop the running generation, keeping the text received so far.
    pub fn stop_generating(&self) -> bool {
        let running = self.orchestrator.active_count() > 0;
        self.orchestrator.cancel_all();
        running
    }

    /// Generate an image for `prompt` in the active session.
    ///
    /// Failures are recorded in the transcript, not returned.
    pub async fn generate_image(&self, prompt: &str) -> Result<(), ChatError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let session_id = self.store.active_id().ok_or(ChatError::NoActiveSession)?;
        let _guard = self.gate.try_acquire().ok_or(ChatError::GenerationInProgress)?;

        let message_id = self
            .store
            .update(session_id, |session| session.begin_image_exchange(prompt))
            .await
            .ok_or(ChatError::SessionNotFound)?;

        match self.images.generate(prompt).await {
            Ok(image) => {
                let title = self
                    .store
                    .update(session_id, |session| {
                        session.complete_image(message_id, image);
                        session.claim_title().then(|| {
                            session.title = prompt.chars().take(IMAGE_TITLE_CHARS).collect();
                            session.title.clone()
                        })
                    })
                    .await
                    .flatten();
                if let Some(title) = title {
                    self.store
                        .events()
                        .publish(SessionEvent::TitleChanged { session_id, title });
                }
                info!(session_id = %session_id, "image generated");
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "image generation failed");
                self.store
                    .update(session_id, |session| {
                        session.fail(message_id, format!("Failed to generate image. {e}"))
                    })
                    .await;
            }
        }
        Ok(())
    }

    // --- Credential ---

    /// Forget the credential and everything bound to it.
    ///
    /// Running generations are cancelled, in-memory sessions and the
    /// advisory are cleared, and the stored credential is removed. Stored
    /// sessions are kept for the next credential.
    pub async fn change_credential(&self) -> Result<(), ChatError> {
        self.orchestrator.cancel_all();
        self.store.clear();
        self.advisory.dismiss();
        clear_credential(self.kv.as_ref()).await?;
        info!("credential reset");
        Ok(())
    }

    // --- Preferences and notifications ---

    pub async fn theme(&self) -> Theme {
        match self.kv.get(THEME_KEY).await {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).parse().unwrap_or_default(),
            Ok(None) => Theme::default(),
            Err(e) => {
                warn!(error = %e, "failed to read theme");
                Theme::default()
            }
        }
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<(), ChatError> {
        self.kv.set(THEME_KEY, theme.to_string().as_bytes()).await?;
        Ok(())
    }

    pub fn advisory(&self) -> Option<Advisory> {
        self.advisory.current()
    }

    pub fn dismiss_advisory(&self) {
        self.advisory.dismiss();
    }

    pub fn watch_advisory(&self) -> watch::Receiver<Option<Advisory>> {
        self.advisory.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.store.events().subscribe()
    }
}

/// Hold `guard` until the generation task ends.
fn release_after(guard: GateGuard, handle: JoinHandle<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _guard = guard;
        if let Err(e) = handle.await {
            warn!(error = %e, "generation task aborted");
        }
    })
}

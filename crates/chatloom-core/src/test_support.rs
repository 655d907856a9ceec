//! Scripted provider and fixtures shared by unit tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatloom_types::chat::GeneratedImage;
use chatloom_types::config::ChatConfig;
use chatloom_types::error::ImageError;
use chatloom_types::event::SessionEvent;
use chatloom_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StreamEvent, Usage,
};
use tokio::sync::{broadcast, mpsc};

use crate::chat::advisory::AdvisoryState;
use crate::chat::codec::PersistenceCodec;
use crate::chat::orchestrator::{StreamOptions, StreamingOrchestrator};
use crate::chat::store::SessionStore;
use crate::chat::title::TitleGenerator;
use crate::event::EventBus;
use crate::image::ImageGenerator;
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::{EventStream, LlmProvider};
use crate::storage::InMemoryKvStore;

type Item = Result<StreamEvent, LlmError>;

/// What one `stream()` call will yield.
pub(crate) enum StreamScript {
    Events(Vec<Item>),
    Channel(mpsc::UnboundedReceiver<Item>),
}

impl StreamScript {
    /// Yield each chunk as a text delta, then finish.
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut events: Vec<Item> = chunks
            .into_iter()
            .map(|text| Ok(StreamEvent::TextDelta { text: text.into() }))
            .collect();
        events.push(Ok(StreamEvent::Done));
        StreamScript::Events(events)
    }

    /// Yield each chunk, then fail with `error`.
    pub fn failing<I, S>(chunks: I, error: LlmError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut events: Vec<Item> = chunks
            .into_iter()
            .map(|text| Ok(StreamEvent::TextDelta { text: text.into() }))
            .collect();
        events.push(Err(error));
        StreamScript::Events(events)
    }

    /// A stream driven by the test through the returned sender.
    pub fn channel() -> (StreamSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StreamSender(tx), StreamScript::Channel(rx))
    }
}

/// Test-side handle feeding a channel-backed stream.
pub(crate) struct StreamSender(mpsc::UnboundedSender<Item>);

impl StreamSender {
    pub fn text(&self, text: &str) {
        let _ = self.0.send(Ok(StreamEvent::TextDelta {
            text: text.to_string(),
        }));
    }

    pub fn fail(&self, error: LlmError) {
        let _ = self.0.send(Err(error));
    }

    pub fn finish(self) {
        let _ = self.0.send(Ok(StreamEvent::Done));
    }
}

#[derive(Default)]
struct Inner {
    streams: Mutex<VecDeque<StreamScript>>,
    completions: Mutex<VecDeque<Result<String, LlmError>>>,
    stream_requests: Mutex<Vec<CompletionRequest>>,
    complete_requests: Mutex<Vec<CompletionRequest>>,
}

/// Provider whose responses are queued up front by the test.
///
/// An unscripted `stream()` finishes immediately with no text; an unscripted
/// `complete()` fails.
#[derive(Clone)]
pub(crate) struct ScriptedProvider {
    inner: Arc<Inner>,
    capabilities: ProviderCapabilities,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            capabilities: ProviderCapabilities {
                streaming: true,
                vision: true,
                search_grounding: true,
                max_context_tokens: 1_048_576,
                max_output_tokens: 65_536,
            },
        }
    }

    pub fn boxed(&self) -> Arc<BoxLlmProvider> {
        Arc::new(BoxLlmProvider::new(self.clone()))
    }

    pub fn push_stream(&self, script: StreamScript) {
        self.inner.streams.lock().unwrap().push_back(script);
    }

    pub fn push_completion(&self, result: Result<&str, LlmError>) {
        self.inner
            .completions
            .lock()
            .unwrap()
            .push_back(result.map(str::to_string));
    }

    pub fn stream_requests(&self) -> Vec<CompletionRequest> {
        self.inner.stream_requests.lock().unwrap().clone()
    }

    pub fn complete_requests(&self) -> Vec<CompletionRequest> {
        self.inner.complete_requests.lock().unwrap().clone()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send {
        self.inner
            .complete_requests
            .lock()
            .unwrap()
            .push(request.clone());
        let model = request.model.clone();
        let next = self.inner.completions.lock().unwrap().pop_front();
        async move {
            let content = next.unwrap_or_else(|| {
                Err(LlmError::Provider {
                    message: "no scripted completion".to_string(),
                })
            })?;
            Ok(CompletionResponse {
                content,
                model,
                finish_reason: Some("STOP".to_string()),
                usage: Usage::default(),
            })
        }
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        self.inner.stream_requests.lock().unwrap().push(request);
        let script = self.inner.streams.lock().unwrap().pop_front();
        match script {
            Some(StreamScript::Events(events)) => Box::pin(futures_util::stream::iter(events)),
            Some(StreamScript::Channel(mut rx)) => Box::pin(async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            }),
            None => Box::pin(futures_util::stream::iter(vec![Ok(StreamEvent::Done)])),
        }
    }
}

/// A store and orchestrator wired to a [`ScriptedProvider`] and an
/// in-memory KV store.
pub(crate) struct Harness {
    pub provider: ScriptedProvider,
    pub kv: Arc<InMemoryKvStore>,
    pub store: Arc<SessionStore<InMemoryKvStore>>,
    pub advisory: AdvisoryState,
    pub orchestrator: StreamingOrchestrator<InMemoryKvStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_kv(ScriptedProvider::new(), Arc::new(InMemoryKvStore::new()))
    }

    pub fn with_kv(provider: ScriptedProvider, kv: Arc<InMemoryKvStore>) -> Self {
        let config = ChatConfig::default();
        let codec = PersistenceCodec::new(provider.boxed(), config.model.clone());
        let store = Arc::new(SessionStore::new(Arc::clone(&kv), codec, EventBus::default()));
        let advisory = AdvisoryState::new();
        let orchestrator = StreamingOrchestrator::new(
            Arc::clone(&store),
            TitleGenerator::new(provider.boxed(), &config),
            advisory.clone(),
            StreamOptions::from_config(&config),
        );
        Self {
            provider,
            kv,
            store,
            advisory,
            orchestrator,
        }
    }
}

/// Wait for the first event `select` accepts, skipping the rest.
pub(crate) async fn next_event<T>(
    rx: &mut broadcast::Receiver<SessionEvent>,
    mut select: impl FnMut(&SessionEvent) -> Option<T>,
) -> T {
    let wait = async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if let Some(value) = select(&event) {
                return value;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(30), wait)
        .await
        .expect("timed out waiting for event")
}

/// Image generator returning a fixed result.
pub(crate) struct StaticImages {
    error: Option<ImageError>,
}

impl StaticImages {
    pub fn ok() -> Self {
        Self { error: None }
    }

    pub fn failing(error: ImageError) -> Self {
        Self { error: Some(error) }
    }
}

impl ImageGenerator for StaticImages {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<GeneratedImage, ImageError>> + Send {
        let result = match &self.error {
            Some(ImageError::EmptyPrompt) => Err(ImageError::EmptyPrompt),
            Some(ImageError::Unavailable(reason)) => Err(ImageError::Unavailable(reason.clone())),
            None => Ok(GeneratedImage {
                url: format!("https://images.test/{}", prompt.len()),
                prompt: prompt.to_string(),
                model: "static".to_string(),
            }),
        };
        async move { result }
    }
}

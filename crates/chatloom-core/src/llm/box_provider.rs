//! BoxLlmProvider -- object-safe dynamic dispatch wrapper for LlmProvider.
//!
//! 1. Define an object-safe `LlmProviderDyn` trait with boxed futures
//! 2. Blanket-impl `LlmProviderDyn` for all `T: LlmProvider`
//! 3. `BoxLlmProvider` wraps `Box<dyn LlmProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use chatloom_types::llm::{CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities};

use super::provider::{EventStream, LlmProvider};

/// Object-safe version of [`LlmProvider`] with boxed futures.
pub trait LlmProviderDyn: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> &ProviderCapabilities;

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>>;

    fn stream_boxed(&self, request: CompletionRequest) -> EventStream;
}

impl<T: LlmProvider> LlmProviderDyn for T {
    fn name(&self) -> &str {
        LlmProvider::name(self)
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        LlmProvider::capabilities(self)
    }

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>> {
        Box::pin(self.complete(request))
    }

    fn stream_boxed(&self, request: CompletionRequest) -> EventStream {
        self.stream(request)
    }
}

/// Type-erased provider shared by every conversation and the title generator.
///
/// Since `LlmProvider` uses RPITIT, it cannot be used as a trait object directly.
/// `BoxLlmProvider` provides equivalent methods that delegate to the inner
/// `LlmProviderDyn` trait object.
pub struct BoxLlmProvider {
    inner: Box<dyn LlmProviderDyn + Send + Sync>,
}

impl BoxLlmProvider {
    /// Wrap a concrete `LlmProvider` in a type-erased box.
    pub fn new<T: LlmProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn capabilities(&self) -> &ProviderCapabilities {
        self.inner.capabilities()
    }

    /// Send a completion request and receive the full response.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        self.inner.complete_boxed(request).await
    }

    /// Send a streaming completion request. Returns a stream of events.
    pub fn stream(&self, request: CompletionRequest) -> EventStream {
        self.inner.stream_boxed(request)
    }
}

impl std::fmt::Debug for BoxLlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxLlmProvider")
            .field("name", &self.name())
            .finish()
    }
}

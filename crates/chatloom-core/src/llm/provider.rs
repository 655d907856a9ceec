//! LlmProvider trait definition.
//!
//! This is the core abstraction that generative backends implement.
//! Uses RPITIT for `complete` and `Pin<Box<dyn Stream>>` for `stream`
//! (streams need to be object-safe for the BoxLlmProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use chatloom_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StreamEvent,
};

/// Boxed stream of events produced by a streaming completion.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Trait for generative backends (Gemini, test doubles).
///
/// Implementations live in chatloom-infra (e.g., `GeminiProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "gemini").
    fn name(&self) -> &str;

    /// What this provider supports (streaming, vision, search grounding).
    fn capabilities(&self) -> &ProviderCapabilities;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    ///
    /// Errors that happen before the first byte arrives are yielded as the
    /// first stream item rather than returned eagerly.
    fn stream(&self, request: CompletionRequest) -> EventStream;
}

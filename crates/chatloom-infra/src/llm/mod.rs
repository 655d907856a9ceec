//! LLM provider implementations.
//!
//! Contains the Gemini implementation of the [`LlmProvider`] trait defined
//! in `chatloom-core`, a factory ([`create_provider`]) that builds it from
//! a credential and [`ChatConfig`], and a connection check
//! ([`test_provider_connection`]) used before a new key is stored.
//!
//! [`LlmProvider`]: chatloom_core::llm::provider::LlmProvider

pub mod gemini;

use secrecy::SecretString;

use chatloom_core::llm::box_provider::BoxLlmProvider;
use chatloom_types::config::ChatConfig;
use chatloom_types::llm::{CompletionRequest, LlmError};

use self::gemini::GeminiProvider;

/// Create a [`BoxLlmProvider`] for `api_key`.
///
/// # Errors
///
/// Returns [`LlmError::AuthenticationFailed`] for a blank key, or a
/// provider error if the HTTP client cannot be built.
pub fn create_provider(api_key: &str, config: &ChatConfig) -> Result<BoxLlmProvider, LlmError> {
    let key = api_key.trim();
    if key.is_empty() {
        return Err(LlmError::AuthenticationFailed);
    }

    let mut provider = GeminiProvider::new(SecretString::from(key.to_string()), config.model.clone())?;
    if let Some(base_url) = config.base_url.as_deref() {
        provider = provider.with_base_url(base_url.to_string());
    }
    Ok(BoxLlmProvider::new(provider))
}

/// Verify provider connectivity with a minimal one-shot request.
///
/// # Errors
///
/// Returns the LLM error if the provider fails to respond.
pub async fn test_provider_connection(provider: &BoxLlmProvider, model: &str) -> Result<(), LlmError> {
    let mut request = CompletionRequest::one_shot(model, "Hello");
    request.max_output_tokens = Some(10);
    request.temperature = Some(0.0);
    provider.complete(&request).await?;
    Ok(())
}

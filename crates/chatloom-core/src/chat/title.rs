//! Session title derivation via a one-shot backend call.
//!
//! Titles are derived from the first user message after the first
//! successful exchange. A failed or empty backend answer falls back to a
//! truncated copy of the user message.

use std::sync::Arc;

use chatloom_types::chat::{PLACEHOLDER_TITLE, SessionId};
use chatloom_types::config::ChatConfig;
use chatloom_types::llm::CompletionRequest;
use tracing::{debug, warn};

use super::store::SessionStore;
use crate::llm::box_provider::BoxLlmProvider;
use crate::storage::KvStore;

#[derive(Debug, Clone)]
pub struct TitleGenerator {
    provider: Arc<BoxLlmProvider>,
    model: String,
    max_chars: usize,
    fallback_chars: usize,
}

impl TitleGenerator {
    pub fn new(provider: Arc<BoxLlmProvider>, config: &ChatConfig) -> Self {
        Self {
            provider,
            model: config.title_model.clone(),
            max_chars: config.title_max_chars,
            fallback_chars: config.title_fallback_chars,
        }
    }

    /// Derive a title and assign it to the session.
    pub async fn generate<K: KvStore>(
        &self,
        store: &SessionStore<K>,
        session_id: SessionId,
        first_user_text: &str,
    ) {
        let title = self.derive(first_user_text).await;
        if !store.set_title(session_id, title).await {
            debug!(session_id = %session_id, "session gone before title arrived");
        }
    }

    /// Ask the backend for a title, falling back to the user text.
    #[tracing::instrument(name = "derive_title", skip(self, first_user_text), fields(model = %self.model))]
    pub async fn derive(&self, first_user_text: &str) -> String {
        let request = CompletionRequest::one_shot(self.model.clone(), title_prompt(first_user_text));
        match self.provider.complete(&request).await {
            Ok(response) => {
                let title = clean_title(&response.content, self.max_chars);
                if title.is_empty() {
                    self.fallback(first_user_text)
                } else {
                    title
                }
            }
            Err(e) => {
                warn!(error = %e, "title generation failed, using fallback");
                self.fallback(first_user_text)
            }
        }
    }

    /// The first user text cut to the fallback length, with `...` when cut.
    pub fn fallback(&self, first_user_text: &str) -> String {
        let text = first_user_text.trim();
        if text.is_empty() {
            return PLACEHOLDER_TITLE.to_string();
        }
        let mut title: String = text.chars().take(self.fallback_chars).collect();
        if text.chars().count() > self.fallback_chars {
            title.push_str("...");
        }
        title
    }
}

fn title_prompt(first_user_text: &str) -> String {
    format!(
        "Create a short title (max 4 words) for this chat. No quotes:\n\nUser: \"{first_user_text}\"\n\nTitle:"
    )
}

/// Trim, strip every quote character, and cut to `max_chars`.
fn clean_title(raw: &str, max_chars: usize) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != '"' && *c != '\'')
        .take(max_chars)
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;
    use chatloom_types::llm::LlmError;

    fn generator(provider: &ScriptedProvider) -> TitleGenerator {
        TitleGenerator::new(provider.boxed(), &ChatConfig::default())
    }

    #[test]
    fn test_title_prompt_shape() {
        assert_eq!(
            title_prompt("Hello"),
            "Create a short title (max 4 words) for this chat. No quotes:\n\nUser: \"Hello\"\n\nTitle:"
        );
    }

    #[test]
    fn test_clean_title_strips_quotes_and_truncates() {
        assert_eq!(clean_title("  \"Rust's Borrow Checker\"  ", 40), "Rusts Borrow Checker");
        let long = "a".repeat(60);
        assert_eq!(clean_title(&long, 40).chars().count(), 40);
    }

    #[tokio::test]
    async fn test_derive_uses_backend_answer() {
        let provider = ScriptedProvider::new();
        provider.push_completion(Ok("\"Friendly Greeting\"\n"));
        let title = generator(&provider).derive("Hello").await;

        assert_eq!(title, "Friendly Greeting");
        let requests = provider.complete_requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].stream);
        assert!(requests[0].tools.is_empty());
        assert!(requests[0].contents[0].text().contains("User: \"Hello\""));
    }

    #[tokio::test]
    async fn test_derive_falls_back_on_error() {
        let provider = ScriptedProvider::new();
        provider.push_completion(Err(LlmError::Provider {
            message: "down".to_string(),
        }));
        let text = "Explain how tokio schedules tasks across threads";
        let title = generator(&provider).derive(text).await;
        assert_eq!(title, "Explain how tokio schedules ta...");
    }

    #[tokio::test]
    async fn test_derive_falls_back_on_empty_answer() {
        let provider = ScriptedProvider::new();
        provider.push_completion(Ok("  \"\"  "));
        assert_eq!(generator(&provider).derive("Hello").await, "Hello");
    }

    #[test]
    fn test_fallback_counts_chars_not_bytes() {
        let provider = ScriptedProvider::new();
        let generator = generator(&provider);
        let text = "é".repeat(31);
        let title = generator.fallback(&text);
        assert_eq!(title.chars().count(), 33);
        assert!(title.ends_with("..."));
        assert_eq!(generator.fallback("   "), PLACEHOLDER_TITLE);
    }
}

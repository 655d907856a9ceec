//! GeminiProvider -- concrete [`LlmProvider`] implementation for Google Gemini.
//!
//! Sends requests to the Generative Language API (`/v1beta/models/...`).
//! The API key is wrapped in [`secrecy::SecretString`] and is only exposed
//! when building request headers.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use chatloom_core::llm::provider::{EventStream, LlmProvider};
use chatloom_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, Usage,
};

use super::streaming::{create_gemini_stream, API_KEY_HEADER};
use super::types::{
    error_for_status, GeminiContent, GeminiRequest, GeminiResponse, GeminiTool, GenerationConfig,
};

/// Public endpoint of the Generative Language API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini LLM provider.
///
/// Does not derive `Debug`; the key never appears in output.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    capabilities: ProviderCapabilities,
}

impl GeminiProvider {
    /// Create a provider for `model`.
    pub fn new(api_key: SecretString, model: String) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        let capabilities = Self::capabilities_for_model(&model);

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            capabilities,
        })
    }

    /// The default model for this provider.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Override the base URL (proxies, local test servers).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn capabilities_for_model(model: &str) -> ProviderCapabilities {
        if model.contains("pro") || model.contains("flash") {
            ProviderCapabilities {
                streaming: true,
                vision: true,
                search_grounding: true,
                max_context_tokens: 1_048_576,
                max_output_tokens: 65_536,
            }
        } else {
            ProviderCapabilities {
                streaming: true,
                vision: false,
                search_grounding: false,
                max_context_tokens: 32_768,
                max_output_tokens: 8_192,
            }
        }
    }

    /// Full URL for `method` on the request's model (or the default model).
    fn url(&self, request: &CompletionRequest, method: &str) -> String {
        let model = if request.model.is_empty() {
            &self.model
        } else {
            &request.model
        };
        format!("{}/v1beta/models/{model}:{method}", self.base_url)
    }

    fn to_gemini_request(request: &CompletionRequest) -> GeminiRequest {
        let generation_config = (request.max_output_tokens.is_some()
            || request.temperature.is_some())
        .then(|| GenerationConfig {
            max_output_tokens: request.max_output_tokens,
            temperature: request.temperature,
        });

        GeminiRequest {
            contents: request.contents.iter().map(GeminiContent::from).collect(),
            tools: request.tools.iter().copied().map(GeminiTool::from).collect(),
            generation_config,
        }
    }
}

impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    #[tracing::instrument(skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = Self::to_gemini_request(request);
        let url = self.url(request, "generateContent");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), "gemini request rejected");
            return Err(error_for_status(status.as_u16(), &error_body));
        }

        let gemini_resp: GeminiResponse = response.json().await.map_err(|e| {
            LlmError::Deserialization(format!("failed to parse response: {e}"))
        })?;

        Ok(CompletionResponse {
            content: gemini_resp.text(),
            model: gemini_resp
                .model_version
                .clone()
                .unwrap_or_else(|| request.model.clone()),
            finish_reason: gemini_resp.finish_reason().map(str::to_string),
            usage: gemini_resp
                .usage_metadata
                .as_ref()
                .map(Usage::from)
                .unwrap_or_default(),
        })
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        let body = Self::to_gemini_request(&request);
        let url = format!("{}?alt=sse", self.url(&request, "streamGenerateContent"));
        tracing::debug!(model = %request.model, turns = request.contents.len(), "opening gemini stream");

        create_gemini_stream(&self.client, &url, body, &self.api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatloom_types::llm::{Content, Part, Tool};

    fn make_provider() -> GeminiProvider {
        GeminiProvider::new(
            SecretString::from("test-key-not-real"),
            "gemini-2.5-flash".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(make_provider().name(), "gemini");
    }

    #[test]
    fn test_flash_capabilities() {
        let provider = make_provider();
        let caps = provider.capabilities();
        assert!(caps.streaming);
        assert!(caps.vision);
        assert!(caps.search_grounding);
        assert_eq!(caps.max_context_tokens, 1_048_576);
    }

    #[test]
    fn test_url_uses_request_model() {
        let provider = make_provider().with_base_url("http://localhost:8080/".to_string());
        let request = CompletionRequest::one_shot("gemini-2.5-pro", "Title:");
        assert_eq!(
            provider.url(&request, "generateContent"),
            "http://localhost:8080/v1beta/models/gemini-2.5-pro:generateContent"
        );

        let request = CompletionRequest::one_shot("", "Title:");
        assert_eq!(
            provider.url(&request, "streamGenerateContent"),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash:streamGenerateContent"
        );
    }

    #[test]
    fn test_to_gemini_request() {
        let request = CompletionRequest {
            model: "gemini-2.5-flash".to_string(),
            contents: vec![
                Content::user(vec![Part::text("Hello")]),
                Content::model("Hi there!"),
                Content::user(vec![Part::text("How are you?")]),
            ],
            tools: vec![Tool::GoogleSearch],
            max_output_tokens: None,
            temperature: Some(0.2),
            stream: true,
        };

        let body = serde_json::to_value(GeminiProvider::to_gemini_request(&request)).unwrap();
        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "Hi there!");
        assert_eq!(body["tools"][0], serde_json::json!({"google_search": {}}));
        assert_eq!(body["generationConfig"]["temperature"], 0.2);
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn test_one_shot_has_no_tools_or_config() {
        let body = serde_json::to_value(GeminiProvider::to_gemini_request(
            &CompletionRequest::one_shot("gemini-2.5-flash", "Title:"),
        ))
        .unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("generationConfig").is_none());
    }
}

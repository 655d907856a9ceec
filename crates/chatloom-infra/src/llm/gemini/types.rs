//! Gemini Generative Language API types.
//!
//! Wire structures for `generateContent` and `streamGenerateContent`. They
//! are NOT the generic LLM types from chatloom-types; the client converts
//! between the two.

use serde::{Deserialize, Serialize};

use chatloom_types::llm::{Content, LlmError, Part, Tool, Usage};

/// Request body for `generateContent` / `streamGenerateContent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<GeminiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// A conversation turn on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

impl From<&Content> for GeminiContent {
    fn from(content: &Content) -> Self {
        Self {
            role: Some(content.role.to_string()),
            parts: content.parts.iter().map(GeminiPart::from).collect(),
        }
    }
}

/// One part of a turn. Exactly one of `text` / `inline_data` is set on
/// requests; responses may carry other part kinds, which are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    /// Set on reasoning summaries, which are not part of the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl From<&Part> for GeminiPart {
    fn from(part: &Part) -> Self {
        match part {
            Part::Text { text } => Self {
                text: Some(text.clone()),
                ..Self::default()
            },
            Part::InlineData { mime_type, data } => Self {
                inline_data: Some(InlineData {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                }),
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Server-side tool declaration. Serializes as `{"google_search":{}}`.
#[derive(Debug, Clone, Serialize)]
pub struct GeminiTool {
    pub google_search: GoogleSearch,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GoogleSearch {}

impl From<Tool> for GeminiTool {
    fn from(tool: Tool) -> Self {
        match tool {
            Tool::GoogleSearch => Self {
                google_search: GoogleSearch::default(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// A full response, or one SSE chunk of a streamed response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    pub model_version: Option<String>,
    /// Present when an error is reported inside the stream.
    #[serde(default)]
    pub error: Option<GeminiErrorBody>,
}

impl GeminiResponse {
    /// Answer text of the first candidate, excluding thought parts.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| !p.thought.unwrap_or(false))
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

impl From<&UsageMetadata> for Usage {
    fn from(meta: &UsageMetadata) -> Self {
        Usage {
            input_tokens: meta.prompt_token_count,
            output_tokens: meta.candidates_token_count,
        }
    }
}

/// Error envelope: `{"error": {"code": 429, "message": "...", "status": "RESOURCE_EXHAUSTED"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiErrorResponse {
    pub error: GeminiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl GeminiErrorBody {
    /// Human-readable message including the status name when present.
    fn describe(&self) -> String {
        match &self.status {
            Some(status) => format!("{status}: {}", self.message),
            None => self.message.clone(),
        }
    }

    /// Map the envelope to an [`LlmError`] using its embedded code.
    pub fn into_llm_error(self) -> LlmError {
        let code = self.code;
        let message = self.describe();
        error_for_code(code, message)
    }
}

/// Map a non-success HTTP status and its body to an [`LlmError`].
///
/// The body is parsed as an error envelope when possible so the message
/// carries the API's status name (e.g. `RESOURCE_EXHAUSTED`).
pub fn error_for_status(status: u16, body: &str) -> LlmError {
    let message = match serde_json::from_str::<GeminiErrorResponse>(body) {
        Ok(envelope) => envelope.error.describe(),
        Err(_) => body.trim().to_string(),
    };
    error_for_code(status, message)
}

fn error_for_code(code: u16, message: String) -> LlmError {
    match code {
        // Gemini answers a malformed key with 400 INVALID_ARGUMENT.
        400 if message.contains("API_KEY_INVALID") || message.contains("API key not valid") => {
            LlmError::AuthenticationFailed
        }
        400 => LlmError::InvalidRequest(message),
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited { message },
        500 | 503 => LlmError::Overloaded(message),
        _ => LlmError::Provider {
            message: format!("HTTP {code}: {message}"),
        },
    }
}

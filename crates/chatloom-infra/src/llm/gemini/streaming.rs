//! SSE stream creation for `streamGenerateContent?alt=sse`.
//!
//! Each SSE `data:` payload is a complete [`GeminiResponse`] carrying the
//! next text fragment. The final chunk carries `finishReason` and usage.
//! Errors may arrive as an HTTP status before the stream starts or as an
//! `{"error": ...}` payload mid-stream.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};

use chatloom_core::llm::provider::EventStream;
use chatloom_types::llm::{LlmError, StreamEvent, Usage};

use super::types::{error_for_status, GeminiRequest, GeminiResponse};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// Create a streaming SSE connection to the Gemini API.
///
/// The request is not sent until the returned stream is first polled.
pub fn create_gemini_stream(
    client: &reqwest::Client,
    url: &str,
    body: GeminiRequest,
    api_key: &SecretString,
) -> EventStream {
    let client = client.clone();
    let url = url.to_string();
    let api_key = api_key.clone();

    Box::pin(async_stream::try_stream! {
        let response = client
            .post(&url)
            .header(API_KEY_HEADER, api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            Err::<(), LlmError>(error_for_status(status.as_u16(), &error_body))?;
            unreachable!();
        }

        let mut events = response.bytes_stream().eventsource();
        while let Some(event) = events.next().await {
            let event = event.map_err(|e| LlmError::Stream(e.to_string()))?;
            for stream_event in parse_chunk(&event.data)? {
                yield stream_event;
            }
        }

        yield StreamEvent::Done;
    })
}

/// Translate one SSE `data:` payload into stream events.
///
/// Empty payloads and chunks with no answer text (e.g. grounding metadata
/// only) yield nothing.
pub fn parse_chunk(data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let chunk: GeminiResponse = serde_json::from_str(data)
        .map_err(|e| LlmError::Deserialization(format!("invalid stream chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(error.into_llm_error());
    }

    let mut events = Vec::new();
    let text = chunk.text();
    if !text.is_empty() {
        events.push(StreamEvent::TextDelta { text });
    }
    if let Some(reason) = chunk.finish_reason() {
        if let Some(usage) = chunk.usage_metadata.as_ref() {
            events.push(StreamEvent::Usage(Usage::from(usage)));
        }
        events.push(StreamEvent::Finished {
            reason: reason.to_string(),
        });
    }
    Ok(events)
}

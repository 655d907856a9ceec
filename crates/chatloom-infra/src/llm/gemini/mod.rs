//! Google Gemini LLM provider implementation.
//!
//! This module provides the [`GeminiProvider`] which implements the
//! [`LlmProvider`](chatloom_core::llm::provider::LlmProvider) trait for the
//! Generative Language API, including SSE streaming via `alt=sse`.

pub mod client;
pub mod streaming;
pub mod types;

pub use client::GeminiProvider;

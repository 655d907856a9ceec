//! Infrastructure layer for Chatloom.
//!
//! Contains implementations of the ports defined in `chatloom-core`:
//! SQLite key-value storage, the Gemini provider, the Pollinations image
//! generator, plus configuration and credential resolution.

pub mod config;
pub mod credential;
pub mod image;
pub mod llm;
pub mod sqlite;

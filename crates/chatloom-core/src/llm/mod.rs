//! Generative backend abstractions for Chatloom.
//!
//! - `LlmProvider`: RPITIT trait for concrete backends
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch
//! - `ErrorClass`: maps backend failures to user-facing outcomes

pub mod box_provider;
pub mod classify;
pub mod provider;

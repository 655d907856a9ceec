//! Client-facing services.

pub mod chat;
pub mod credential;

pub use chat::ChatService;

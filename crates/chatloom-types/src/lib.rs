//! Shared domain types for Chatloom.
//!
//! This crate contains the core domain types used across the workspace:
//! sessions, messages, durable records, backend request shapes, events,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod llm;
pub mod storage;

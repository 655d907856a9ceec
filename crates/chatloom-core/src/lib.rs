//! Business logic and port definitions for Chatloom.
//!
//! This crate defines the ports (`LlmProvider`, `KvStore`, `ImageGenerator`)
//! that the infrastructure layer implements, and the session orchestration
//! built on them. It depends only on `chatloom-types`, never on
//! `chatloom-infra` or any network or database crate.

pub mod chat;
pub mod event;
pub mod image;
pub mod llm;
pub mod service;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

//! Storage abstractions for Chatloom.
//!
//! Defines the key-value store port. The durable implementation lives in
//! chatloom-infra.

pub mod kv_store;
pub mod memory;

pub use kv_store::KvStore;
pub use memory::InMemoryKvStore;

//! Key-value store trait.
//!
//! Sessions, the credential and the theme preference are each stored as an
//! opaque byte value under a fixed key. Implementations live in
//! chatloom-infra (SQLite) and [`super::memory`] (in-process).

use chatloom_types::error::RepositoryError;

/// Trait for durable key-value storage.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition). The futures
/// are `Send` so stores can be driven from spawned generation tasks.
pub trait KvStore: Send + Sync + 'static {
    /// Get a value by key. Returns None if the key does not exist.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>, RepositoryError>> + Send;

    /// Set a value for a key (upsert).
    fn set(
        &self,
        key: &str,
        value: &[u8],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a key. No-op if key does not exist.
    fn delete(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}

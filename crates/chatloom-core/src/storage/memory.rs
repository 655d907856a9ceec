//! In-process key-value store backed by a `DashMap`.

use std::future::Future;

use chatloom_types::error::RepositoryError;
use dashmap::DashMap;

use super::kv_store::KvStore;

/// Volatile [`KvStore`] used by `--ephemeral` runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: DashMap<String, Vec<u8>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for InMemoryKvStore {
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, RepositoryError>> + Send {
        let value = self.entries.get(key).map(|entry| entry.value().clone());
        async move { Ok(value) }
    }

    fn set(&self, key: &str, value: &[u8]) -> impl Future<Output = Result<(), RepositoryError>> + Send {
        self.entries.insert(key.to_string(), value.to_vec());
        async { Ok(()) }
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), RepositoryError>> + Send {
        self.entries.remove(key);
        async { Ok(()) }
    }
}

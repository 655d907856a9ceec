//! SQLite key-value store implementation.
//!
//! Implements `KvStore` from `chatloom-core` on the `kv_store` table. Values
//! are stored as opaque blobs.

use chatloom_core::storage::KvStore;
use chatloom_types::error::RepositoryError;
use chrono::Utc;
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `KvStore`.
pub struct SqliteKvStore {
    pool: DatabasePool,
}

impl SqliteKvStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|row| {
            row.try_get::<Vec<u8>, _>("value")
                .map_err(|e| RepositoryError::Query(e.to_string()))
        })
        .transpose()
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"INSERT INTO kv_store (key, value, created_at, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}

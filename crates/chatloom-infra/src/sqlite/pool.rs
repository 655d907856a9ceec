//! Database pool with split reader/writer connections in WAL mode.
//!
//! SQLite allows only one writer at a time. `DatabasePool` keeps a
//! multi-connection reader pool for concurrent reads and a single-connection
//! writer pool for serialized writes.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// File name of the database inside the data directory.
pub const DATABASE_FILE: &str = "chatloom.db";

/// Split read/write pool for SQLite with WAL mode.
///
/// - `reader`: Multi-connection pool (up to 4) for concurrent SELECT queries.
/// - `writer`: Single-connection pool for serialized INSERT/UPDATE/DELETE.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if missing) the database at `database_url`.
    ///
    /// Runs migrations on the writer before the reader pool is opened.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .create_if_missing(true);

        let read_opts = base_opts.clone().read_only(true);
        let write_opts = base_opts;

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(write_opts)
            .await?;

        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(read_opts)
            .await?;

        Ok(Self { reader, writer })
    }

    /// Open the database file inside `data_dir`.
    pub async fn open_in(data_dir: &Path) -> Result<Self, sqlx::Error> {
        Self::new(&database_url(data_dir)).await
    }
}

/// SQLite URL for the database file inside `data_dir`.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}", data_dir.join(DATABASE_FILE).display())
}

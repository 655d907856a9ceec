//! SQLite storage.

pub mod kv;
pub mod pool;

pub use kv::SqliteKvStore;
pub use pool::DatabasePool;

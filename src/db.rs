pub mod manager;
pub mod sqlite;

pub use manager::{CacheStore, StoredEntry};
pub use sqlite::SqliteCacheStore;

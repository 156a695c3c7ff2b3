//! 缓存持久化接口。
//!
//! 缓存本身只在内存中做 TTL / LRU 管理，启动时通过 [`CacheStore`] 读入，
//! 结束时整体写回。具体的落盘方式（目前是 SQLite）对缓存逻辑不可见。
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::common::error::Result;

/// 持久化的一条缓存记录。
///
/// `key` 与 `value` 都是 YAML 文本，由缓存层负责序列化。
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredEntry {
    pub key: String,
    pub value: String,
    pub inserted_at: DateTime<Utc>,
    /// LRU 顺序，越大表示越近被访问
    pub last_access: i64,
}

/// 缓存落盘的统一异步接口，按缓存 id 区分不同的缓存实例。
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 读取某个缓存的全部记录；从未保存过时返回空列表。
    async fn load_entries(&self, cache_id: &str) -> Result<Vec<StoredEntry>>;

    /// 用给定记录整体替换某个缓存的内容。
    async fn save_entries(&self, cache_id: &str, entries: &[StoredEntry]) -> Result<()>;
}

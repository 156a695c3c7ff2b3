//! SQLite 缓存存储
//!
//! 所有缓存实例共用一张 `cache_entries` 表，以 `cache_id` 区分。
//! 保存时在一个事务里先删除该缓存的旧记录再整体写入，
//! 保证磁盘上的内容始终对应某一次完整的保存。

use std::path::Path;
use crate::common::error::Result;
use crate::db::manager::{CacheStore, StoredEntry};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    pool: Pool<Sqlite>,
}

impl SqliteCacheStore {
    /// 打开（必要时创建）指定路径的数据库文件。
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.create_table().await?;
        info!("✅ 缓存数据库已打开：{}", path.display());
        Ok(storage)
    }

    /// 内存数据库，进程结束即丢失。
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let storage = Self { pool };
        storage.create_table().await?;
        Ok(storage)
    }

    async fn create_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                inserted_at TEXT NOT NULL,
                last_access INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (cache_id, key)
            );
            "#,
        )
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn load_entries(&self, cache_id: &str) -> Result<Vec<StoredEntry>> {
        let entries = sqlx::query_as::<_, StoredEntry>(
            "SELECT key, value, inserted_at, last_access FROM cache_entries
             WHERE cache_id = ? ORDER BY last_access ASC",
        )
            .bind(cache_id)
            .fetch_all(&self.pool)
            .await?;
        debug!("读取缓存 {}：{} 条", cache_id, entries.len());
        Ok(entries)
    }

    async fn save_entries(&self, cache_id: &str, entries: &[StoredEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cache_entries WHERE cache_id = ?")
            .bind(cache_id)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query(
                "INSERT INTO cache_entries (cache_id, key, value, inserted_at, last_access)
                 VALUES (?, ?, ?, ?, ?)",
            )
                .bind(cache_id)
                .bind(&entry.key)
                .bind(&entry.value)
                .bind(entry.inserted_at)
                .bind(entry.last_access)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("写入缓存 {}：{} 条", cache_id, entries.len());
        Ok(())
    }
}

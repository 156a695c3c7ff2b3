//! # cache 模块
//!
//! 带 TTL 过期与 LRU 容量上限的键值缓存，可通过 [`CacheStore`] 在多次运行之间持久化。
//! 落盘时键和值都编码为 YAML 文本，任意 YAML 值（包括非字符串键的映射）都能原样保存。
//!
//! - 条目从写入时刻开始计时，超过 TTL 后读取即视为不存在；
//! - 写入后条目数超过上限时，先清理过期条目，再淘汰最久未访问的条目；
//! - `get` 返回 `None` 表示未命中；值类型本身可以是 `Option`，
//!   此时 `Some(None)` 表示“查过了，确实没有”，调用方不必再请求远端。

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use crate::common::error::Result;
use crate::db::{CacheStore, StoredEntry};

/// 缓存策略：过期时间与最大条目数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl CachePolicy {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries }
    }

    fn is_expired(&self, inserted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // 时钟回拨时 age 为负数，按未过期处理
        match now.signed_duration_since(inserted_at).to_std() {
            Ok(age) => age > self.ttl,
            Err(_) => false,
        }
    }
}

struct Entry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    last_access: u64,
}

struct CacheState<K, V> {
    entries: HashMap<K, Entry<V>>,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V> CacheState<K, V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn purge_expired(&mut self, policy: &CachePolicy, now: DateTime<Utc>) {
        self.entries.retain(|_, e| !policy.is_expired(e.inserted_at, now));
    }

    fn evict_overflow(&mut self, max_entries: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

/// 通用的 TTL + LRU 缓存。
///
/// 内部状态由互斥锁保护，可以放在 `Arc` 中被多个并发任务同时读写。
pub struct ResultCache<K, V> {
    id: String,
    policy: CachePolicy,
    state: Mutex<CacheState<K, V>>,
    store: Arc<dyn CacheStore>,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    pub fn new(id: impl Into<String>, policy: CachePolicy, store: Arc<dyn CacheStore>) -> Self {
        Self {
            id: id.into(),
            policy,
            state: Mutex::new(CacheState { entries: HashMap::new(), tick: 0 }),
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    /// 以给定时间判断是否过期，命中时刷新该条目的访问顺序。
    pub fn get_at(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        let mut state = self.lock();
        let expired = match state.entries.get(key) {
            None => return None,
            Some(e) => self.policy.is_expired(e.inserted_at, now),
        };
        if expired {
            state.entries.remove(key);
            return None;
        }

        let tick = state.next_tick();
        let entry = state.entries.get_mut(key)?;
        entry.last_access = tick;
        Some(entry.value.clone())
    }

    pub fn set(&self, key: K, value: V) {
        self.set_at(key, value, Utc::now());
    }

    /// 写入（覆盖）一个条目，超出容量时按 LRU 淘汰。
    pub fn set_at(&self, key: K, value: V, now: DateTime<Utc>) {
        let mut state = self.lock();
        let tick = state.next_tick();
        state.entries.insert(key, Entry { value, inserted_at: now, last_access: tick });

        if state.entries.len() > self.policy.max_entries {
            state.purge_expired(&self.policy, now);
            let evicted = state.evict_overflow(self.policy.max_entries);
            if evicted > 0 {
                debug!("缓存 {} 淘汰 {} 条最久未访问的记录", self.id, evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 从存储中读取缓存内容，替换当前内存中的状态。
    ///
    /// 已过期的条目直接丢弃；无法反序列化的条目记录警告后跳过。
    /// 多次调用结果相同。
    pub async fn load(&self) -> Result<()> {
        let stored = self.store.load_entries(&self.id).await?;
        let now = Utc::now();

        let mut stored: Vec<StoredEntry> = stored
            .into_iter()
            .filter(|e| !self.policy.is_expired(e.inserted_at, now))
            .collect();
        stored.sort_by_key(|e| e.last_access);

        let mut state = CacheState { entries: HashMap::new(), tick: 0 };
        for entry in stored {
            let key = match serde_yaml::from_str::<K>(&entry.key) {
                Ok(k) => k,
                Err(e) => {
                    warn!("缓存 {} 中的键无法解析，已跳过：{}", self.id, e);
                    continue;
                }
            };
            let value = match serde_yaml::from_str::<V>(&entry.value) {
                Ok(v) => v,
                Err(e) => {
                    warn!("缓存 {} 中的值无法解析，已跳过：{}", self.id, e);
                    continue;
                }
            };
            let tick = state.next_tick();
            state.entries.insert(key, Entry { value, inserted_at: entry.inserted_at, last_access: tick });
        }
        state.evict_overflow(self.policy.max_entries);

        let count = state.entries.len();
        *self.lock() = state;
        debug!("缓存 {} 已加载 {} 条记录", self.id, count);
        Ok(())
    }

    /// 把当前内容整体写回存储。进程退出前必须调用，否则本轮写入的内容会丢失。
    ///
    /// 无法编码的条目记录警告后跳过，不影响其它条目。
    pub async fn save(&self) -> Result<()> {
        let entries = {
            let mut state = self.lock();
            state.purge_expired(&self.policy, Utc::now());
            let mut entries = Vec::with_capacity(state.entries.len());
            for (key, entry) in state.entries.iter() {
                let encoded = serde_yaml::to_string(key)
                    .and_then(|k| serde_yaml::to_string(&entry.value).map(|v| (k, v)));
                match encoded {
                    Ok((key, value)) => entries.push(StoredEntry {
                        key,
                        value,
                        inserted_at: entry.inserted_at,
                        last_access: entry.last_access as i64,
                    }),
                    Err(e) => warn!("缓存 {} 中的条目无法编码，已跳过：{}", self.id, e),
                }
            }
            entries
        };

        self.store.save_entries(&self.id, &entries).await?;
        debug!("缓存 {} 已保存 {} 条记录", self.id, entries.len());
        Ok(())
    }
}

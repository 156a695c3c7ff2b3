//! # recency 模块
//!
//! 按文件最后修改时间过滤搜索结果，只保留时间窗口内仍有更新的文件。
//!
//! 每个未缓存的命中结果都需要一次提交记录查询，这是整个流程里请求最多的一步，
//! 因此按批次执行并在批次之间冷却。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use crate::common::cache::ResultCache;
use crate::common::error::Result;
use crate::common::utils::months_ago;
use crate::model::{CommitDate, SearchHit};
use crate::service::github::{with_retry, CodeHost};
use crate::service::scheduler::BatchScheduler;

/// 以内容哈希为键的提交时间缓存
pub type DateCache = ResultCache<String, CommitDate>;

/// 修改时间不早于 `now` 往前 `months` 个月（含边界）时视为仍在维护。
pub fn is_recent(date: DateTime<Utc>, now: DateTime<Utc>, months: u32) -> bool {
    date >= months_ago(now, months)
}

/// 先查缓存，未命中时请求远端并把结果（包括“没有日期”）写入缓存。
pub async fn resolve_commit_date(
    api: &dyn CodeHost,
    cache: &DateCache,
    hit: &SearchHit,
    max_retries: u32,
) -> Result<CommitDate> {
    if let Some(cached) = cache.get(&hit.content_hash) {
        return Ok(cached);
    }

    let date = with_retry(max_retries, move || {
        api.latest_modification(&hit.owner, &hit.repo, &hit.file_path)
    })
    .await?;
    cache.set(hit.content_hash.clone(), date);
    Ok(date)
}

/// 单个内容哈希的查询结论
#[derive(Debug, Clone, Copy)]
enum Lookup {
    Dated(DateTime<Utc>),
    Undated,
    Failed,
}

pub struct RecencyFilter {
    api: Arc<dyn CodeHost>,
    cache: Arc<DateCache>,
    months: u32,
    max_retries: u32,
}

impl RecencyFilter {
    pub fn new(api: Arc<dyn CodeHost>, cache: Arc<DateCache>, months: u32, max_retries: u32) -> Self {
        Self { api, cache, months, max_retries }
    }

    /// 过滤搜索结果，保留的结果保持输入顺序。
    ///
    /// 查不到日期的结果直接丢弃；单个结果请求失败时记录错误并跳过（不写缓存，下次运行会重试）。
    pub async fn filter(
        &self,
        hits: Vec<SearchHit>,
        now: DateTime<Utc>,
        scheduler: &mut BatchScheduler,
    ) -> Result<Vec<SearchHit>> {
        let total = hits.len();

        // 同一内容哈希只查询一次，其余命中结果沿用同一个结论
        let lookups: Vec<SearchHit> = {
            let mut seen = HashSet::new();
            hits.iter()
                .filter(|hit| seen.insert(hit.content_hash.as_str()))
                .cloned()
                .collect()
        };

        let outcomes = scheduler
            .run(lookups, |_, hit| {
                let api = Arc::clone(&self.api);
                let cache = Arc::clone(&self.cache);
                let max_retries = self.max_retries;
                async move {
                    let outcome = resolve_commit_date(api.as_ref(), &cache, &hit, max_retries).await;
                    (hit, outcome)
                }
            })
            .await?;

        let mut verdicts = HashMap::new();
        for (hit, outcome) in outcomes {
            let verdict = match outcome {
                Ok(Some(date)) => Lookup::Dated(date),
                Ok(None) => Lookup::Undated,
                Err(e) if e.is_item_local() => {
                    error!("❌ 查询 {} 的提交时间失败：{}", hit.label(), e);
                    Lookup::Failed
                }
                Err(e) => return Err(e),
            };
            verdicts.insert(hit.content_hash, verdict);
        }

        let mut retained = Vec::new();
        let (mut stale, mut undated, mut failed) = (0, 0, 0);
        for hit in hits {
            match verdicts.get(&hit.content_hash).copied().unwrap_or(Lookup::Failed) {
                Lookup::Dated(date) if is_recent(date, now, self.months) => retained.push(hit),
                Lookup::Dated(date) => {
                    debug!("{} 最后修改于 {}，已过期", hit.label(), date);
                    stale += 1;
                }
                Lookup::Undated => {
                    debug!("{} 没有提交记录，已跳过", hit.label());
                    undated += 1;
                }
                Lookup::Failed => failed += 1,
            }
        }

        info!(
            "时间过滤完成：共 {} 条，保留 {} 条，过期 {} 条，无日期 {} 条，失败 {} 条",
            total, retained.len(), stale, undated, failed
        );
        Ok(retained)
    }
}

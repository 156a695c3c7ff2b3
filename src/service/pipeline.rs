//! # pipeline 模块
//!
//! 把各个步骤串成一次完整的采集：
//!
//! 1. 代码搜索，得到候选文件；
//! 2. 按最后修改时间过滤（提交时间缓存 + 批量调度）；
//! 3. 读取并解析候选文件（代理列表缓存 + 批量调度）；
//! 4. 按密钥去重汇总，写入带时间戳的结果文件。
//!
//! 两个缓存在运行结束时写回存储；即使本轮因为解析错误中止，
//! 已经完成的查询结果也会被保存，下次运行可以直接复用。
//! 缓存保存失败只记录日志，结果文件照常写出。

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use chrono::{Local, Utc};
use tracing::{debug, error, info, warn};
use crate::common::cache::{CachePolicy, ResultCache};
use crate::common::error::Result;
use crate::common::utils::output_file_name;
use crate::db::CacheStore;
use crate::model::{AppConfig, ProxyDocument, ProxyRecord, SearchHit};
use crate::service::aggregator::Aggregator;
use crate::service::extractor::{extract_proxies, ExtractOptions, ProxyCache};
use crate::service::github::{with_retry, CodeHost};
use crate::service::recency::{DateCache, RecencyFilter};
use crate::service::scheduler::BatchScheduler;

pub const DATE_CACHE_ID: &str = "dateCache";
pub const PROXY_CACHE_ID: &str = "proxyCache";

pub struct Pipeline {
    api: Arc<dyn CodeHost>,
    date_cache: Arc<DateCache>,
    proxy_cache: Arc<ProxyCache>,
    config: AppConfig,
}

impl Pipeline {
    pub fn new(api: Arc<dyn CodeHost>, store: Arc<dyn CacheStore>, config: &AppConfig) -> Self {
        let date_policy = CachePolicy::new(
            std::time::Duration::from_secs(config.cache.date_ttl_secs),
            config.cache.date_max_entries,
        );
        let proxy_policy = CachePolicy::new(
            std::time::Duration::from_secs(config.cache.proxy_ttl_secs),
            config.cache.proxy_max_entries,
        );

        Self {
            api,
            date_cache: Arc::new(ResultCache::new(DATE_CACHE_ID, date_policy, store.clone())),
            proxy_cache: Arc::new(ResultCache::new(PROXY_CACHE_ID, proxy_policy, store)),
            config: config.clone(),
        }
    }

    pub fn date_cache(&self) -> &DateCache {
        &self.date_cache
    }

    pub fn proxy_cache(&self) -> &ProxyCache {
        &self.proxy_cache
    }

    pub async fn load_caches(&self) -> Result<()> {
        self.date_cache.load().await?;
        self.proxy_cache.load().await?;
        Ok(())
    }

    pub async fn save_caches(&self) -> Result<()> {
        self.date_cache.save().await?;
        self.proxy_cache.save().await?;
        Ok(())
    }

    /// 完整执行一次采集，返回结果文件路径。
    pub async fn run(&self, domain: &str, months: u32) -> Result<PathBuf> {
        let collected = self.collect(domain, months).await;
        // 缓存写不进去不影响本轮结果，只是下次运行要重新请求
        if let Err(e) = self.save_caches().await {
            error!("❌ 保存缓存失败：{}", e);
        }
        let proxies = collected?;

        let path = self.write_output(proxies).await?;
        info!("Result saved at {}", path.display());
        Ok(path)
    }

    /// 搜索、过滤、解析并去重，返回按首次出现顺序排列的代理节点。
    pub async fn collect(&self, domain: &str, months: u32) -> Result<Vec<ProxyRecord>> {
        let max_retries = self.config.http.max_retries;
        let api = self.api.as_ref();
        let hits = with_retry(max_retries, move || api.search(domain)).await?;
        info!("搜索到 {} 个文件", hits.len());

        let batch = &self.config.batch;
        let mut date_stage = BatchScheduler::new("commit-date", batch.size, batch.date_cooldown());
        let filter = RecencyFilter::new(self.api.clone(), self.date_cache.clone(), months, max_retries);
        let candidates = filter.filter(hits, Utc::now(), &mut date_stage).await?;
        info!("Found: {} repository", candidates.len());

        // 内容相同的文件只需读取一次，解析出的节点反正也会被去重
        let candidates = distinct_by_content(candidates);
        let total = candidates.len();

        let options = ExtractOptions {
            normalize_shorthand: self.config.extract.normalize_shorthand,
            max_retries,
        };
        let mut blob_stage = BatchScheduler::new("blob", batch.size, batch.blob_cooldown());
        let mut aggregator = Aggregator::new();

        blob_stage
            .run_with(
                candidates,
                |i, hit| {
                    let api = Arc::clone(&self.api);
                    let cache = Arc::clone(&self.proxy_cache);
                    async move {
                        info!("Fetching {} of {}: {} - {}", i + 1, total, hit.repo, hit.owner);
                        let outcome = extract_proxies(api.as_ref(), &cache, &hit, options).await;
                        (hit, outcome)
                    }
                },
                |results| {
                    for (hit, outcome) in results {
                        match outcome {
                            Ok(Some(records)) => {
                                let found = records.len();
                                let accepted = aggregator.offer_all(records);
                                debug!("{}：{} 个节点，新增 {} 个", hit.label(), found, accepted);
                            }
                            Ok(None) => debug!("{} 中没有可用的代理列表", hit.label()),
                            Err(e) if e.is_item_local() => {
                                error!("❌ 读取 {} 失败：{}", hit.label(), e);
                            }
                            Err(e) => {
                                error!("❌ 解析 {} 失败，中止本轮采集", hit.label());
                                return Err(e);
                            }
                        }
                    }
                    Ok(())
                },
            )
            .await?;

        if aggregator.is_empty() {
            warn!("⚠️ 没有找到可用的节点");
        } else {
            info!("✅ 汇总完成：共 {} 个不重复节点", aggregator.len());
        }
        Ok(aggregator.into_proxies())
    }

    async fn write_output(&self, proxies: Vec<ProxyRecord>) -> Result<PathBuf> {
        let dir = &self.config.output.dir;
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(output_file_name(Local::now()));
        let text = serde_yaml::to_string(&ProxyDocument { proxies })?;
        tokio::fs::write(&path, text).await?;
        Ok(path)
    }
}

/// 按内容哈希去掉重复的命中结果，保留每个哈希第一次出现的位置。
pub fn distinct_by_content(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let before = hits.len();
    let mut seen = HashSet::new();
    let distinct: Vec<SearchHit> = hits
        .into_iter()
        .filter(|hit| seen.insert(hit.content_hash.clone()))
        .collect();
    if distinct.len() < before {
        debug!("{} 个命中结果内容重复，只读取一次", before - distinct.len());
    }
    distinct
}

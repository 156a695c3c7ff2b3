//! 测试用的内存版 [`CodeHost`]，记录每类请求的调用次数。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use crate::common::error::{Result, ScoutError};
use crate::model::{CommitDate, SearchHit};
use crate::service::github::CodeHost;

#[derive(Default)]
pub struct FakeCodeHost {
    pub hits: Vec<SearchHit>,
    /// (owner, repo, path) -> 提交时间
    pub dates: HashMap<(String, String, String), DateTime<Utc>>,
    /// content hash -> 文件内容
    pub blobs: HashMap<String, String>,
    /// 请求这些仓库时返回 500
    pub failing_repos: HashSet<String>,
    pub search_calls: AtomicUsize,
    pub date_calls: AtomicUsize,
    pub blob_calls: AtomicUsize,
}

impl FakeCodeHost {
    pub fn with_hit(mut self, hit: SearchHit, date: Option<DateTime<Utc>>) -> Self {
        if let Some(date) = date {
            self.dates.insert((hit.owner.clone(), hit.repo.clone(), hit.file_path.clone()), date);
        }
        self.hits.push(hit);
        self
    }

    pub fn with_blob(mut self, content_hash: &str, content: &str) -> Self {
        self.blobs.insert(content_hash.to_string(), content.to_string());
        self
    }

    pub fn failing(mut self, repo: &str) -> Self {
        self.failing_repos.insert(repo.to_string());
        self
    }

    pub fn total_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
            + self.date_calls.load(Ordering::SeqCst)
            + self.blob_calls.load(Ordering::SeqCst)
    }

    fn check(&self, repo: &str) -> Result<()> {
        if self.failing_repos.contains(repo) {
            return Err(ScoutError::Remote { status: 500, message: "Server Error".to_string() });
        }
        Ok(())
    }
}

#[async_trait]
impl CodeHost for FakeCodeHost {
    async fn search(&self, _domain: &str) -> Result<Vec<SearchHit>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.clone())
    }

    async fn latest_modification(&self, owner: &str, repo: &str, path: &str) -> Result<CommitDate> {
        self.date_calls.fetch_add(1, Ordering::SeqCst);
        // 让出一次调度，同批次的其他任务得以并发执行
        tokio::task::yield_now().await;
        self.check(repo)?;
        Ok(self
            .dates
            .get(&(owner.to_string(), repo.to_string(), path.to_string()))
            .copied())
    }

    async fn fetch_blob_content(&self, _owner: &str, repo: &str, content_hash: &str) -> Result<Bytes> {
        self.blob_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.check(repo)?;
        self.blobs
            .get(content_hash)
            .map(|c| Bytes::from(c.clone().into_bytes()))
            .ok_or_else(|| ScoutError::Remote { status: 404, message: "Not Found".to_string() })
    }
}

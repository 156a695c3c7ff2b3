//! # github 模块
//!
//! GitHub REST API 的薄封装，只提供采集流程用到的三类请求：
//!
//! - 代码搜索（自动翻页）；
//! - 查询某个文件最近一次提交的时间；
//! - 按 blob sha 读取文件内容。
//!
//! 任何非 2xx 响应都会转换为 [`ScoutError::Remote`]。请求本身不做重试，
//! 调用方按需用 [`with_retry`] 包一层。

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};
use crate::common::error::{Result, ScoutError};
use crate::model::app_config::{HttpConfig, SearchConfig};
use crate::model::{CommitDate, SearchHit};

/// GitHub 代码搜索最多只返回前 1000 条结果
const SEARCH_RESULT_LIMIT: usize = 1000;
const API_VERSION: &str = "2022-11-28";

/// 判断是否还需要请求下一页：本页不满、已拿到全部结果或达到搜索上限时停止。
pub fn has_next_page(page_len: usize, per_page: usize, collected: usize, total_count: u64) -> bool {
    page_len >= per_page && (collected as u64) < total_count && collected < SEARCH_RESULT_LIMIT
}

/// 采集流程依赖的远端代码托管接口。
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// 搜索提到目标域名的 YAML 文件，内部自动翻页。
    async fn search(&self, domain: &str) -> Result<Vec<SearchHit>>;

    /// 文件在仓库中最近一次被修改的时间，没有提交记录时返回 `None`。
    async fn latest_modification(&self, owner: &str, repo: &str, path: &str) -> Result<CommitDate>;

    /// 按内容哈希读取文件原始字节（已完成传输编码的解码）。
    async fn fetch_blob_content(&self, owner: &str, repo: &str, content_hash: &str) -> Result<Bytes>;
}

#[derive(Debug, Deserialize)]
struct CodeSearchResponse {
    total_count: u64,
    #[serde(default)]
    incomplete_results: bool,
    items: Vec<CodeSearchItem>,
}

#[derive(Debug, Deserialize)]
struct CodeSearchItem {
    name: String,
    path: String,
    sha: String,
    repository: RepositoryRef,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct RepositoryRef {
    name: String,
    owner: OwnerRef,
}

#[derive(Debug, Deserialize)]
struct OwnerRef {
    login: String,
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    committer: Option<Signature>,
}

#[derive(Debug, Deserialize)]
struct Signature {
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct BlobResponse {
    pub content: String,
    pub encoding: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl From<CodeSearchItem> for SearchHit {
    fn from(item: CodeSearchItem) -> Self {
        SearchHit {
            file_name: item.name,
            file_path: item.path,
            content_hash: item.sha,
            owner: item.repository.owner.login,
            repo: item.repository.name,
            score: item.score,
        }
    }
}

/// 对可重试的错误（限流、5xx、超时、连接失败）按 1s、2s、4s… 指数退避重试，
/// 最多重试 `max_retries` 次；为 0 时只请求一次。
pub async fn with_retry<T, F, Fut>(max_retries: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if attempt < max_retries && e.is_transient() => {
                attempt += 1;
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!("请求失败，{} 秒后第 {} 次重试：{}", delay.as_secs(), attempt, e);
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

/// 搜索语句：锚点字符串 + 域名，并限定 YAML 语言，例如 `"proxies:" example.com language:yaml`
pub fn build_query(marker: &str, domain: &str, language: &str) -> String {
    format!("{} {} language:{}", marker, domain, language)
}

/// 按 `encoding` 字段解码 blob 内容。base64 内容中的换行会被忽略。
pub fn decode_blob(blob: &BlobResponse) -> Result<Bytes> {
    match blob.encoding.as_str() {
        "base64" => {
            let compact: String = blob.content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let raw = STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| ScoutError::Decode(e.to_string()))?;
            Ok(Bytes::from(raw))
        }
        "utf-8" | "utf8" => Ok(Bytes::from(blob.content.clone().into_bytes())),
        other => Err(ScoutError::Decode(format!("unsupported encoding: {}", other))),
    }
}

pub struct GithubClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
    search: SearchConfig,
}

impl GithubClient {
    pub fn new(token: &str, http: &HttpConfig, search: &SearchConfig) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(ScoutError::CredentialMissing);
        }
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(http.user_agent.clone())
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: http.api_base.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            search: search.clone(),
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or(body);
            return Err(ScoutError::Remote { status: status.as_u16(), message });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl CodeHost for GithubClient {
    async fn search(&self, domain: &str) -> Result<Vec<SearchHit>> {
        let query = build_query(&self.search.marker, domain, &self.search.language);
        let per_page = self.search.per_page.clamp(1, 100) as usize;
        let url = format!("{}/search/code", self.api_base);
        info!("搜索：{}", query);

        let mut hits: Vec<SearchHit> = Vec::new();
        let mut page = 1usize;
        loop {
            let request = self.client.get(&url).query(&[
                ("q", query.clone()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ]);
            let response: CodeSearchResponse = self.get_json(request).await?;
            if response.incomplete_results {
                debug!("第 {} 页搜索结果不完整", page);
            }

            let count = response.items.len();
            hits.extend(response.items.into_iter().map(SearchHit::from));
            debug!("第 {} 页：{} 条，累计 {} / {}", page, count, hits.len(), response.total_count);

            if !has_next_page(count, per_page, hits.len(), response.total_count) {
                break;
            }
            page += 1;
        }

        Ok(hits)
    }

    async fn latest_modification(&self, owner: &str, repo: &str, path: &str) -> Result<CommitDate> {
        let url = format!("{}/repos/{}/{}/commits", self.api_base, owner, repo);
        let request = self.client.get(&url).query(&[("path", path), ("per_page", "1")]);
        let commits: Vec<CommitItem> = self.get_json(request).await?;

        Ok(commits
            .into_iter()
            .next()
            .and_then(|c| c.commit.committer)
            .and_then(|s| s.date))
    }

    async fn fetch_blob_content(&self, owner: &str, repo: &str, content_hash: &str) -> Result<Bytes> {
        let url = format!("{}/repos/{}/{}/git/blobs/{}", self.api_base, owner, repo, content_hash);
        let blob: BlobResponse = self.get_json(self.client.get(&url)).await?;
        decode_blob(&blob)
    }
}

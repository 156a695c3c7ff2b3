pub mod app_config;
pub mod proxy;
pub mod search;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use app_config::AppConfig;
pub use proxy::{ProxyNode, ProxyRecord, Rejection, TrojanProxy, VmessProxy, WsOpts};
pub use search::SearchHit;

/// 文件最后一次提交的时间；`None` 表示查不到日期，这本身也是可以缓存的结果。
pub type CommitDate = Option<DateTime<Utc>>;

/// 一个文件解析后的代理列表；`None` 表示文件无法使用（解析失败或没有 `proxies` 字段）。
pub type ParsedProxyList = Option<Vec<ProxyRecord>>;

/// 最终写入结果文件的文档：`proxies: [...]`
#[derive(Debug, Serialize, Deserialize)]
pub struct ProxyDocument {
    pub proxies: Vec<ProxyRecord>,
}

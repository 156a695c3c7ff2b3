use thiserror::Error;

/// 采集流程中的错误类型。
///
/// - `Remote`：上游接口返回非成功状态码；对单个文件的请求失败只跳过该文件；
/// - `Parse`：YAML 内容无法解析且不属于已知的“垃圾格式”，会中止本轮运行；
/// - 其余为底层库错误的透传。
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("remote request failed with status {status}: {message}")]
    Remote { status: u16, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("YAML parsing error: {0}")]
    Parse(String),
    #[error("Authentication key is required for filtering.")]
    CredentialMissing,
    #[error("failed to decode blob: {0}")]
    Decode(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Task(#[from] tokio::task::JoinError),
}

impl ScoutError {
    /// 限流（429）、服务端错误（5xx）与网络层错误可以重试，其它错误立即返回。
    pub fn is_transient(&self) -> bool {
        match self {
            ScoutError::Remote { status, .. } => *status == 429 || *status >= 500,
            ScoutError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// 只影响单个文件的错误：跳过该文件即可，不必中止整轮运行。
    pub fn is_item_local(&self) -> bool {
        matches!(self, ScoutError::Remote { .. } | ScoutError::Http(_) | ScoutError::Decode(_))
    }
}

pub type Result<T, E = ScoutError> = std::result::Result<T, E>;

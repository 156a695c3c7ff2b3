use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// 环境变量前缀，例如 `PROXYSCOUT__BATCH__SIZE=20`。
const ENV_PREFIX: &str = "PROXYSCOUT";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
    pub http: HttpConfig,
    pub extract: ExtractConfig,
    pub output: OutputConfig,
    pub log: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// 搜索关键字中固定的锚点字符串，用来命中真正的代理列表文件
    pub marker: String,
    pub language: String,
    pub per_page: u32,
    /// 默认的时间窗口（月）
    pub default_months: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    pub size: usize,
    pub date_cooldown_ms: u64,
    pub blob_cooldown_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// 为空时使用 `~/.cache/proxyscout`
    pub dir: Option<PathBuf>,
    pub date_ttl_secs: u64,
    pub date_max_entries: usize,
    pub proxy_ttl_secs: u64,
    pub proxy_max_entries: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    pub api_base: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractConfig {
    pub normalize_shorthand: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 控制台只输出这些级别，例如 `["INFO", "WARN", "ERROR"]`
    pub console_levels: Vec<String>,
    /// 日志文件记录的最低级别
    pub file_level: String,
    /// 为空时写入缓存目录下的 `logs`
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// 加载顺序：内置默认值 → 当前目录下可选的 `Config` 文件 → 环境变量。
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::builder()?
            .add_source(config::File::with_name("Config").required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let config = config.try_deserialize()?;
        Ok(config)
    }

    fn builder() -> anyhow::Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = config::Config::builder()
            .set_default("search.marker", "\"proxies:\"")?
            .set_default("search.language", "yaml")?
            .set_default("search.per_page", 100)?
            .set_default("search.default_months", 3)?
            .set_default("batch.size", 50)?
            .set_default("batch.date_cooldown_ms", 1000)?
            .set_default("batch.blob_cooldown_ms", 3000)?
            .set_default("cache.date_ttl_secs", 60 * 60)?
            .set_default("cache.date_max_entries", 500)?
            .set_default("cache.proxy_ttl_secs", 60 * 60 * 2)?
            .set_default("cache.proxy_max_entries", 1000)?
            .set_default("http.api_base", "https://api.github.com")?
            .set_default("http.user_agent", concat!("proxyscout/", env!("CARGO_PKG_VERSION")))?
            .set_default("http.timeout_secs", 30)?
            .set_default("http.max_retries", 0)?
            .set_default("extract.normalize_shorthand", false)?
            .set_default("output.dir", ".")?
            .set_default("log.console_levels", vec!["INFO", "WARN", "ERROR"])?
            .set_default("log.file_level", "DEBUG")?;
        Ok(builder)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|d| d.join("proxyscout")))
            .unwrap_or_else(|| PathBuf::from(".proxyscout-cache"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log.dir.clone().unwrap_or_else(|| self.cache_dir().join("logs"))
    }
}

impl BatchConfig {
    pub fn date_cooldown(&self) -> Duration {
        Duration::from_millis(self.date_cooldown_ms)
    }

    pub fn blob_cooldown(&self) -> Duration {
        Duration::from_millis(self.blob_cooldown_ms)
    }
}

impl Default for AppConfig {
    /// 仅包含内置默认值，不读取文件与环境变量。
    fn default() -> Self {
        Self::builder()
            .and_then(|b| Ok(b.build()?.try_deserialize()?))
            .unwrap_or_else(|e| panic!("built-in defaults are invalid: {e}"))
    }
}

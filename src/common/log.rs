use std::fs::{create_dir_all, OpenOptions};
use tracing::level_filters::LevelFilter;
use tracing::{Level, Metadata};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};
use crate::common::utils::parse_level;
use crate::model::AppConfig;

pub const LOG_FILE_NAME: &str = "proxyscout.log";

/// 控制台允许输出的级别；无法识别的写法直接忽略。
pub fn console_levels(names: &[String]) -> Vec<Level> {
    names.iter().filter_map(|name| parse_level(name)).collect()
}

/// 初始化日志：文件按 `log.file_level` 追加记录，控制台只输出 `log.console_levels` 中列出的级别。
///
/// 必须在程序输出任何日志之前调用，重复调用会返回错误。
pub fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let log_dir = config.log_dir();
    create_dir_all(&log_dir)?;

    let file_level = parse_level(&config.log.file_level).unwrap_or(Level::DEBUG);
    let allowed = console_levels(&config.log.console_levels);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))?;
    let file_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_filter(LevelFilter::from_level(file_level));

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_filter(filter_fn(move |metadata: &Metadata| allowed.contains(metadata.level())));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_levels_skip_unknown() {
        let names = vec!["info".to_string(), "loud".to_string(), "ERROR".to_string()];
        assert_eq!(console_levels(&names), vec![Level::INFO, Level::ERROR]);
    }

    #[test]
    fn test_default_console_levels() {
        let config = AppConfig::default();
        let levels = console_levels(&config.log.console_levels);
        assert!(levels.contains(&Level::INFO));
        assert!(!levels.contains(&Level::DEBUG));
    }
}

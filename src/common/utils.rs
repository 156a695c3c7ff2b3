use chrono::{DateTime, Local, Months, Utc};
use tracing::Level;

// 把字符串转换成 Level，忽略大小写，不识别时返回 None
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

/// 计算时间窗口的起点：`now` 往前推 `months` 个自然月。
///
/// 目标月份没有对应日期时（如 5 月 31 日往前推 3 个月）落在该月最后一天。
pub fn months_ago(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// 结果文件名，例如 `proxies 10-12-2024 13-35-47.yaml`
pub fn output_file_name(now: DateTime<Local>) -> String {
    format!("proxies {}.yaml", now.format("%d-%m-%Y %H-%M-%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("Info"), Some(Level::INFO));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    fn test_months_ago() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        assert_eq!(months_ago(now, 3), Utc.with_ymd_and_hms(2026, 7, 19, 8, 30, 0).unwrap());

        let end_of_may = Utc.with_ymd_and_hms(2026, 5, 31, 0, 0, 0).unwrap();
        assert_eq!(months_ago(end_of_may, 3), Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_output_file_name() {
        let now = Local.with_ymd_and_hms(2024, 12, 10, 13, 35, 47).unwrap();
        assert_eq!(output_file_name(now), "proxies 10-12-2024 13-35-47.yaml");
    }
}

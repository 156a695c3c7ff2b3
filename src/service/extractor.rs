//! # extractor 模块
//!
//! 读取候选文件内容并提取其中的 `proxies` 列表。
//!
//! 网上流传的订阅配置经常是由各种生成器拼出来的，格式错误很常见。
//! 这里把一小组已知的错误形态视为“没有数据”（返回 `None` 并缓存），
//! 其余无法识别的解析错误作为 [`ScoutError::Parse`] 返回，由调用方中止本轮运行。

use std::borrow::Cow;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;
use crate::common::cache::ResultCache;
use crate::common::error::{Result, ScoutError};
use crate::model::{ParsedProxyList, ProxyRecord, SearchHit};
use crate::service::github::{with_retry, CodeHost};

/// 以内容哈希为键的代理列表缓存
pub type ProxyCache = ResultCache<String, ParsedProxyList>;

/// 已知的、可以安全忽略的 YAML 错误形态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Junk {
    /// 同一个映射里出现重复的键
    DuplicateKey,
    /// 块内容被当成了隐式键，常见于没加花括号的行内写法
    BlockAsImplicitKey,
    /// 引号没有闭合，一直读到文件末尾
    UnterminatedScalar,
}

const JUNK_PATTERNS: &[(&str, Junk)] = &[
    ("duplicate entry with", Junk::DuplicateKey),
    ("mapping values are not allowed in this context", Junk::BlockAsImplicitKey),
    ("could not find expected ':'", Junk::BlockAsImplicitKey),
    ("found unexpected end of stream", Junk::UnterminatedScalar),
];

/// 没加花括号的行内节点：`- name: a, server: b, port: 443`
static SHORTHAND_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^(?P<indent>[ \t]*-[ \t]+)(?P<body>[A-Za-z][\w-]*[ \t]*:[^{}\[\]\n]*,[ \t]*[A-Za-z][\w-]*[ \t]*:[^{}\[\]\n]*?)[ \t]*$",
    )
    .expect("shorthand pattern is valid")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    pub normalize_shorthand: bool,
    pub max_retries: u32,
}

/// 判断一个 YAML 错误是否属于已知的垃圾格式。
pub fn classify_yaml_error(err: &serde_yaml::Error) -> Option<Junk> {
    let message = err.to_string();
    JUNK_PATTERNS
        .iter()
        .find(|(pattern, _)| message.contains(pattern))
        .map(|(_, junk)| *junk)
}

/// 把没加花括号的行内节点改写成行内映射。
///
/// 只是尽力而为的文本替换，可能改坏本来合法的文档，默认不启用。
pub fn normalize_shorthand(text: &str) -> Cow<'_, str> {
    SHORTHAND_ITEM.replace_all(text, "${indent}{${body}}")
}

/// 解析一个文件的内容。
///
/// - 第一个带 `proxies` 序列的文档中的节点被逐个归类，无法归类的节点记录日志后跳过；
/// - 没有 `proxies`、`proxies` 不是序列或文档不是映射时返回 `None`；
/// - `proxies` 为空或其中节点全部无法归类时同样返回 `None`；
/// - 已知垃圾格式返回 `None`，其它解析错误返回 [`ScoutError::Parse`]。
pub fn parse_proxy_document(text: &str) -> Result<ParsedProxyList> {
    for document in serde_yaml::Deserializer::from_str(text) {
        let mut value = match Value::deserialize(document) {
            Ok(value) => value,
            Err(e) => {
                return match classify_yaml_error(&e) {
                    Some(junk) => {
                        debug!("忽略格式错误的文件（{:?}）：{}", junk, e);
                        Ok(None)
                    }
                    None => Err(ScoutError::Parse(e.to_string())),
                };
            }
        };
        // 展开 `<<: *anchor` 形式的合并键
        if let Err(e) = value.apply_merge() {
            debug!("合并键展开失败：{}", e);
        }

        let entries = value
            .as_mapping()
            .and_then(|m| m.get("proxies"))
            .and_then(Value::as_sequence);
        let Some(entries) = entries else {
            continue;
        };

        let mut records = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            match ProxyRecord::classify(entry.clone()) {
                Ok(record) => records.push(record),
                Err(reason) => debug!("跳过第 {} 个节点：{}", i + 1, reason),
            }
        }
        if records.is_empty() {
            debug!("proxies 中没有可用的节点");
            return Ok(None);
        }
        return Ok(Some(records));
    }

    Ok(None)
}

/// 读取并解析一个候选文件，结果（包括 `None`）按内容哈希缓存。
pub async fn extract_proxies(
    api: &dyn CodeHost,
    cache: &ProxyCache,
    hit: &SearchHit,
    options: ExtractOptions,
) -> Result<ParsedProxyList> {
    if let Some(cached) = cache.get(&hit.content_hash) {
        debug!("缓存命中：{}", hit.label());
        return Ok(cached);
    }

    let raw = with_retry(options.max_retries, move || {
        api.fetch_blob_content(&hit.owner, &hit.repo, &hit.content_hash)
    })
    .await?;
    let text = String::from_utf8_lossy(&raw).into_owned();
    let text = if options.normalize_shorthand {
        normalize_shorthand(&text)
    } else {
        Cow::Borrowed(text.as_str())
    };

    let parsed = parse_proxy_document(&text)?;
    cache.set(hit.content_hash.clone(), parsed.clone());
    Ok(parsed)
}

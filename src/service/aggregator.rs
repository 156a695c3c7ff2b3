use std::collections::HashSet;
use tracing::debug;
use crate::model::ProxyRecord;

/// 跨文件汇总代理节点，按密钥（Trojan 的 password / VMess 的 uuid）去重，保留首次出现的顺序。
///
/// 只在一次运行内有效，不做持久化，也不提供删除操作。
#[derive(Debug, Default)]
pub struct Aggregator {
    proxies: Vec<ProxyRecord>,
    seen: HashSet<String>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 提交一条记录，密钥已经出现过时丢弃。返回是否被接收。
    pub fn offer(&mut self, record: ProxyRecord) -> bool {
        if self.seen.contains(record.dedupe_key()) {
            debug!("重复节点，已忽略：{}", record.node().display_name());
            return false;
        }
        self.seen.insert(record.dedupe_key().to_string());
        self.proxies.push(record);
        true
    }

    /// 依次提交多条记录，返回被接收的数量。
    pub fn offer_all(&mut self, records: impl IntoIterator<Item = ProxyRecord>) -> usize {
        let mut accepted = 0;
        for record in records {
            if self.offer(record) {
                accepted += 1;
            }
        }
        accepted
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn proxies(&self) -> &[ProxyRecord] {
        &self.proxies
    }

    pub fn into_proxies(self) -> Vec<ProxyRecord> {
        self.proxies
    }
}

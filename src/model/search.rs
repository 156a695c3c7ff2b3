use serde::{Deserialize, Serialize};

/// 代码搜索命中的一个文件。
///
/// `content_hash` 是文件内容的 blob sha，只作为缓存键使用：
/// 同一份内容可能出现在多个仓库中，所以它不能当作命中结果的全局唯一标识。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub file_name: String,
    pub file_path: String,
    pub content_hash: String,
    pub owner: String,
    pub repo: String,
    pub score: f64,
}

impl SearchHit {
    pub fn new(owner: &str, repo: &str, path: &str, content_hash: &str) -> Self {
        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            file_name,
            file_path: path.to_string(),
            content_hash: content_hash.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            score: 1.0,
        }
    }

    /// 日志里使用的简短标识，如 `owner/repo:path`
    pub fn label(&self) -> String {
        format!("{}/{}:{}", self.owner, self.repo, self.file_path)
    }
}

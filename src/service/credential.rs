use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use tracing::info;

/// 保存 GitHub 访问令牌的文本文件，默认位于 `~/.config/proxyscout/auth.txt`。
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("无法确定用户主目录"))?;
        Ok(Self::new(home.join(".config").join("proxyscout").join("auth.txt")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取令牌。文件不存在时创建一个空文件并返回 `None`；内容为空也视为没有令牌。
    pub fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let token = text.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.ensure_parent()?;
                std::fs::File::create(&self.path)
                    .with_context(|| format!("创建凭据文件失败：{}", self.path.display()))?;
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("读取凭据文件失败：{}", self.path.display())),
        }
    }

    /// 覆盖保存令牌。
    pub fn store(&self, token: &str) -> Result<()> {
        self.ensure_parent()?;
        std::fs::write(&self.path, token.trim())
            .with_context(|| format!("写入凭据文件失败：{}", self.path.display()))?;
        info!("访问令牌已保存到 {}", self.path.display());
        Ok(())
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

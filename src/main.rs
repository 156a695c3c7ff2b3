mod cli;
mod common;
mod db;
mod model;
mod service;

use std::sync::Arc;
use clap::Parser;
use tracing::{error, info};
use crate::cli::Cli;
use crate::common::log::init_logging;
use crate::db::SqliteCacheStore;
use crate::model::AppConfig;
use crate::service::credential::CredentialStore;
use crate::service::github::GithubClient;
use crate::service::pipeline::Pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    // 必须在任何日志输出之前调用
    init_logging(&config)?;

    let command = Cli::parse().into_command(config.search.default_months);
    let credentials = CredentialStore::default_location()?;

    cli::dispatch(command, &credentials, |token, domain, months| async move {
        if let Err(e) = run_search(&config, &token, &domain, months).await {
            error!("❌ 采集失败：{:#}", e);
            return Err(e);
        }
        Ok(())
    })
    .await
}

async fn run_search(config: &AppConfig, token: &str, domain: &str, months: u32) -> anyhow::Result<()> {
    info!("========== [采集 {}，最近 {} 个月] ==========", domain, months);
    let api = Arc::new(GithubClient::new(token, &config.http, &config.search)?);
    let store = Arc::new(SqliteCacheStore::open(&config.cache_dir().join("cache.db")).await?);

    let pipeline = Pipeline::new(api, store, config);
    pipeline.load_caches().await?;
    pipeline.run(domain, months).await?;
    Ok(())
}

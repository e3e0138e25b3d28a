//! Command implementations for the chc CLI

pub mod catalog;
pub mod migrate;
pub mod serve;

pub use catalog::run_catalog;
pub use migrate::run_migrate;
pub use serve::run_serve;

use anyhow::{Context, Result};
use chc_core::ChcConfig;
use chc_server::db::create_pool_with_options;
use chc_server::db::PgPool;

/// Config from ~/.chc/config.toml and the environment, with a
/// `--database-url` override applied.
pub(crate) fn load_config(database_url: Option<String>) -> Result<ChcConfig> {
    let mut config = ChcConfig::load().context("Failed to load config")?;
    if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
        config.database.url = url;
    }
    Ok(config)
}

/// Pool for the configured database.
pub(crate) async fn connect(config: &ChcConfig) -> Result<PgPool> {
    anyhow::ensure!(
        !config.database.url.trim().is_empty(),
        "DATABASE_URL not set. Set via --database-url, DATABASE_URL env, .env or ~/.chc/config.toml"
    );
    create_pool_with_options(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to create database pool")
}

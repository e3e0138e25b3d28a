//! HTTP server command
//!
//! Applies migrations, then serves until Ctrl+C or SIGTERM.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;

use chc_server::db::migrations;
use chc_server::http::{run_server, ServerConfig};

use super::{connect, load_config};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (overrides config; default 127.0.0.1:8000)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = load_config(args.database_url)?;

    let mut server = ServerConfig::from_config(&config).context("Invalid server config")?;
    if let Some(bind) = args.bind {
        server.bind_addr = bind;
    }
    server.cors_permissive |= args.cors_permissive;

    let pool = connect(&config).await?;
    migrations::run(&pool)
        .await
        .context("Failed to run migrations")?;

    tracing::info!("Starting chc server on {}", server.bind_addr);

    // Blocks until shutdown
    run_server(pool, server).await.context("Server error")?;

    Ok(())
}

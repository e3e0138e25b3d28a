//! Schema migration command

use anyhow::{Context, Result};
use clap::Parser;

use chc_server::db::migrations;

use super::{connect, load_config};

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

pub async fn run_migrate(args: MigrateArgs) -> Result<()> {
    let config = load_config(args.database_url)?;
    let pool = connect(&config).await?;
    migrations::run(&pool)
        .await
        .context("Failed to run migrations")?;
    println!("Migrations applied");
    Ok(())
}

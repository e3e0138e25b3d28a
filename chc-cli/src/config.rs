use anyhow::{Context, Result};
use chc_core::{ChcConfig, ConfigError};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a default config to ~/.chc/config.toml
    Init(InitArgs),
    /// Print the effective config (file + environment), password masked
    Show,
    /// Show config file path
    Path,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Force overwrite existing config
    #[arg(long, short)]
    pub force: bool,
}

pub fn run_config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Init(args) => run_init(args),
        ConfigCommands::Show => run_show(),
        ConfigCommands::Path => {
            println!("{}", ChcConfig::config_path().display());
            Ok(())
        }
    }
}

fn run_init(args: InitArgs) -> Result<()> {
    let config_path = ChcConfig::config_path();

    match ChcConfig::init(&config_path, args.force) {
        Ok(_) => {}
        Err(ConfigError::AlreadyExists(path)) => {
            anyhow::bail!("Config already exists at {:?}\n\nUse --force to overwrite", path);
        }
        Err(e) => return Err(e).context("Failed to write config"),
    }

    println!("Created config at: {:?}", config_path);
    println!("\nNext steps:");
    println!("  1. Edit the config: $EDITOR {:?}", config_path);
    println!("  2. Set database.url (or DATABASE_URL)");
    println!("  3. Run: chc migrate");

    Ok(())
}

fn run_show() -> Result<()> {
    let config = ChcConfig::load().context("Failed to load config")?;
    print!("{}", render(&config)?);
    Ok(())
}

/// TOML rendering with the database password masked.
fn render(config: &ChcConfig) -> Result<String> {
    toml::to_string_pretty(&config.masked()).context("Failed to render config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_masks_password() {
        let mut config = ChcConfig::default();
        config.database.url = "postgres://chc:s3cret@db:5432/chc".into();
        let shown = render(&config).unwrap();
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("[server]"));
    }
}

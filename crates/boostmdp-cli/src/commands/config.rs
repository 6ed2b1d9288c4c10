//! Configuration management commands

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show which configuration file would be loaded
    Path,
}

pub async fn run(cmd: ConfigCommands, explicit: Option<&Path>) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show(explicit).await,
        ConfigCommands::Path => path(explicit).await,
    }
}

async fn show(explicit: Option<&Path>) -> Result<()> {
    let config = crate::config::load(explicit)?;
    println!("Current Configuration");
    println!("=====================\n");
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

async fn path(explicit: Option<&Path>) -> Result<()> {
    match crate::config::find_config_file(explicit)? {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("No configuration file found. Using defaults and environment."),
    }
    Ok(())
}

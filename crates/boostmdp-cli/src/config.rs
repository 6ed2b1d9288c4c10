//! Configuration loading for the binary
//!
//! Sources, later ones overriding earlier ones: the first TOML file found
//! (`--config`, `$BOOSTMDP_CONFIG`, `./boostmdp.toml`,
//! `~/.config/boostmdp/boostmdp.toml`), then `BOOSTMDP_*` environment
//! variables with `__` between nested keys, e.g.
//! `BOOSTMDP_REWARD__SUCCESS_REWARD=10`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use boostmdp_core::BoostConfig;
use config::{ConfigBuilder, Environment, File, FileFormat};

const CONFIG_FILE: &str = "boostmdp.toml";

/// Loads and validates the configuration
pub fn load(explicit: Option<&Path>) -> Result<BoostConfig> {
    let path = find_config_file(explicit)?;
    load_from(path.as_deref(), true)
}

fn load_from(path: Option<&Path>, with_env: bool) -> Result<BoostConfig> {
    let mut builder = ConfigBuilder::<config::builder::DefaultState>::default();

    if let Some(path) = path {
        tracing::info!("Loading config from: {:?}", path);
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    } else {
        tracing::info!("No config file found, using defaults and environment");
    }

    if with_env {
        builder = builder.add_source(
            Environment::with_prefix("BOOSTMDP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
    }

    let config: BoostConfig = builder
        .build()?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Path of the configuration file that `load` would read
pub fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(path) = std::env::var("BOOSTMDP_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Ok(Some(local));
    }

    if let Some(dir) = dirs::config_dir() {
        let user_config = dir.join("boostmdp").join(CONFIG_FILE);
        if user_config.exists() {
            return Ok(Some(user_config));
        }
    }

    Ok(None)
}

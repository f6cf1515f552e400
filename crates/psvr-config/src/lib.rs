//! Persisted settings for the PSVR head tracker.
//!
//! One TOML file holds two tables: `[tracking]` with the sampling and
//! compensation tunables, and `[velocity]` with the per-axis drift bias that
//! calibration and compensated resets refine. Missing keys fall back to
//! their defaults, so a file holding only `[velocity]` is valid.

mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

const APP_DIR: &str = "psvr-tracker";
const CONFIG_FILE: &str = "config.toml";

/// Directory holding the tracker's settings, created on first use.
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join(APP_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Could not create {}", dir.display()))?;
    Ok(dir)
}

/// Location of the settings file inside [`config_dir`].
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Read the settings file. A missing file is a first run and yields
/// defaults with a zero bias.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path()?)
}

/// Write the settings, including the current velocity bias.
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(config, &config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        info!(?path, "No tracker settings yet, starting with zero bias");
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Malformed tracker settings in {}", path.display()))?;
    info!(?path, velocity = ?config.velocity, "Loaded tracker settings");
    Ok(config)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents).with_context(|| format!("Could not write {}", path.display()))?;
    info!(?path, velocity = ?config.velocity, "Saved tracker settings");
    Ok(())
}

//! Config loading and default locations.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::error::EngineError;

/// Load configuration from the given path, or the default location.
///
/// A missing file yields the defaults. The result is validated.
pub fn load_config(path: Option<&str>) -> Result<Config, EngineError> {
    let config_path = match path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    };

    let config = if config_path.exists() {
        let config = read_config(&config_path)?;
        info!(path = %config_path.display(), "loaded config");
        config
    } else {
        info!("no config file found, using defaults");
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<Config, EngineError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Config(format!("failed to read config: {e}")))?;
    toml::from_str(&content)
        .map_err(|e| EngineError::Config(format!("failed to parse config: {e}")))
}

/// Render a configuration as TOML.
pub fn render_config(config: &Config) -> Result<String, EngineError> {
    toml::to_string_pretty(config)
        .map_err(|e| EngineError::Config(format!("failed to serialize config: {e}")))
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("acuity")
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

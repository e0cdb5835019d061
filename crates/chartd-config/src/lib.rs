//! chartd-config: configuration loading for the chartd daemon.
//!
//! Reads `~/.chartd/config.json5`, falling back to defaults when the file is
//! missing. A `.env` file is loaded first so settings can come from the
//! environment during development.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Shell used to launch job commands.
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
        }
    }
}

/// Top-level chartd configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartdConfig {
    /// Path to the SQLite database file. Defaults to ~/.chartd/chartd.db.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl ChartdConfig {
    /// Resolve the database path, falling back to the config directory.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("chartd.db")),
        }
    }
}

/// Resolve the chartd config directory (~/.chartd/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".chartd"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.chartd/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<ChartdConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<ChartdConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(ChartdConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: ChartdConfig = json5::from_str(&content)?;
    Ok(config)
}

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

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    /// Same-class triggers closer together than this are treated as duplicates.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Register the built-in maintenance tasks at startup.
    #[serde(default = "default_true")]
    pub register_builtin_tasks: bool,
}

fn default_dedup_window_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window_secs(),
            register_builtin_tasks: true,
        }
    }
}

/// Execution log location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path (defaults to `~/.stockpulse/stockpulse.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

/// Where trigger events come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// JSON payloads pushed by the host platform's trigger service.
    #[default]
    Native,
    /// In-process timer emitting the multi-interval schedule.
    Interval,
}

/// Trigger source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub mode: TriggerMode,
    /// Tick length of the interval fallback, in seconds.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

fn default_tick_secs() -> u64 {
    60
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::default(),
            tick_secs: default_tick_secs(),
        }
    }
}

/// Top-level stockpulse configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockPulseConfig {
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
}

impl StockPulseConfig {
    /// Resolve the execution log path, falling back to the config directory.
    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("stockpulse.db")),
        }
    }

    /// Resolve the execution log path and create its parent directory.
    pub fn ensure_db_path(&self) -> Result<PathBuf, ConfigError> {
        let path = self.db_path()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(path)
    }
}

/// Resolve the stockpulse config directory (~/.stockpulse/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".stockpulse"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.stockpulse/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<StockPulseConfig, ConfigError> {
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<StockPulseConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(StockPulseConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: StockPulseConfig = json5::from_str(&content)?;
    Ok(config)
}

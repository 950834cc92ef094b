//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/lifeledger/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/lifeledger/` (~/.config/lifeledger/)
//! - Data: `$XDG_DATA_HOME/lifeledger/` (~/.local/share/lifeledger/)
//! - State/Logs: `$XDG_STATE_HOME/lifeledger/` (~/.local/state/lifeledger/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Analytics window configuration
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Storage and identity configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Analytics window sizes
#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    /// Days in rolling series (productivity chart, mood chart)
    #[serde(default = "default_rolling_days")]
    pub rolling_days: u32,

    /// How far back the current-streak walk looks
    #[serde(default = "default_streak_lookback_days")]
    pub streak_lookback_days: u32,

    /// Number of months kept in the monthly income/expense trend
    #[serde(default = "default_monthly_trend_months")]
    pub monthly_trend_months: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            rolling_days: default_rolling_days(),
            streak_lookback_days: default_streak_lookback_days(),
            monthly_trend_months: default_monthly_trend_months(),
        }
    }
}

impl AnalyticsConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.rolling_days == 0 {
            return Err(Error::Config(
                "analytics.rolling_days must be at least 1".to_string(),
            ));
        }
        if self.streak_lookback_days == 0 {
            return Err(Error::Config(
                "analytics.streak_lookback_days must be at least 1".to_string(),
            ));
        }
        if self.monthly_trend_months == 0 {
            return Err(Error::Config(
                "analytics.monthly_trend_months must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_rolling_days() -> u32 {
    7
}

fn default_streak_lookback_days() -> u32 {
    365
}

fn default_monthly_trend_months() -> usize {
    6
}

/// Where records live and whose records they are
#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    /// Signed-in user; records are namespaced by this id.
    /// `None` means the shared guest namespace.
    pub user: Option<String>,

    /// Override for the SQLite database location
    pub database_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.analytics.validate()?;
        Ok(config)
    }

    /// Resolved database path: the `[storage]` override or the XDG default.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(Self::database_path)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/lifeledger/config.toml` (~/.config/lifeledger/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("lifeledger").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/lifeledger/` (~/.local/share/lifeledger/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("lifeledger")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/lifeledger/` (~/.local/state/lifeledger/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("lifeledger")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/lifeledger/data.db` (~/.local/share/lifeledger/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }
}

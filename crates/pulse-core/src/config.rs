//! Configuration file support for pulse
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/pulse/config.toml`
//! - macOS: `~/Library/Application Support/pulse/config.toml`
//! - Windows: `%APPDATA%\pulse\config.toml`

use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default lookahead window in milliseconds.
pub const DEFAULT_LOOKAHEAD_MS: u64 = 100;
/// Default driver update interval in milliseconds.
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 30;
/// Default multiplier applied to the measured lag when widening the horizon.
pub const DEFAULT_LAG_FACTOR: f64 = 2.0;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scheduling window configuration
    pub scheduler: SchedulerSettings,
    /// Driver lag measurement
    pub lag: LagSettings,
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(Error::Config(format!("Config file not found at {:?}", path)))
        }
    }

    /// Load and validate configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return default if not found or invalid
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default config file location
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "pulse") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Check that every value can drive a clock
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.update_interval_ms == 0 {
            return Err(Error::Config("scheduler.update_interval_ms must be > 0".to_string()));
        }
        if !(s.lag_factor.is_finite() && s.lag_factor >= 0.0) {
            return Err(Error::Config(format!(
                "scheduler.lag_factor must be a finite value >= 0, got {}",
                s.lag_factor
            )));
        }
        if !(self.lag.smoothing > 0.0 && self.lag.smoothing <= 1.0) {
            return Err(Error::Config(format!(
                "lag.smoothing must be in (0, 1], got {}",
                self.lag.smoothing
            )));
        }
        Ok(())
    }
}

/// Scheduling window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// How far past `now` ticks may be computed, in milliseconds
    pub lookahead_ms: u64,
    /// Intended period between driver invocations, in milliseconds
    pub update_interval_ms: u64,
    /// Multiplier for the measured lag when widening the horizon.
    ///
    /// The default of 2.0 has not been tuned against real drivers.
    pub lag_factor: f64,
    /// Superseded state transitions kept for queries about the past.
    ///
    /// Transitions the tick cursor has not reached are never dropped.
    pub state_history: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            lookahead_ms: DEFAULT_LOOKAHEAD_MS,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            lag_factor: DEFAULT_LAG_FACTOR,
            state_history: 0,
        }
    }
}

impl SchedulerSettings {
    /// Lookahead in seconds.
    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }

    /// Update interval in seconds.
    pub fn update_interval_secs(&self) -> f64 {
        self.update_interval_ms as f64 / 1000.0
    }

    /// Update interval as a sleep duration.
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// Lag measurement settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagSettings {
    /// Weight of the newest observation in the moving average (0, 1]
    pub smoothing: f64,
    /// Upper bound on the reported lag, in milliseconds
    pub max_lag_ms: u64,
}

impl Default for LagSettings {
    fn default() -> Self {
        Self {
            smoothing: 0.1,
            max_lag_ms: 250,
        }
    }
}

impl LagSettings {
    /// Upper bound on the reported lag, in seconds.
    pub fn max_lag_secs(&self) -> f64 {
        self.max_lag_ms as f64 / 1000.0
    }
}

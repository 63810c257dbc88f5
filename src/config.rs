//! Listener configuration
//!
//! Values come from built-in defaults, then an optional JSON file, then
//! `WHISTLE_*` environment variables. The binary applies CLI flags last and
//! calls [`ListenerConfig::validate`] before starting.

use crate::alarm::{AlertConfig, DEFAULT_COOLDOWN, DEFAULT_FLASH_DURATION};
use crate::audio_buffer::{DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE};
use crate::sensitivity::Sensitivity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Environment variable naming a JSON config file
pub const CONFIG_PATH_ENV: &str = "WHISTLE_CONFIG";

/// Longest strobe pulse accepted
pub const MAX_FLASH_DURATION_MS: u64 = 5_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Detection sensitivity
    pub sensitivity: Sensitivity,

    /// Pulse the strobe on alarm
    pub flash_enabled: bool,

    /// Samples per analysed buffer
    pub buffer_size: usize,

    /// Minimum time between detection alarms (0 disables the cooldown)
    pub cooldown_ms: u64,

    /// Strobe pulse length
    pub flash_duration_ms: u64,

    /// Loop a near-silent sound while listening
    pub keep_alive: bool,

    /// Input device name; the default input device when unset
    pub input_device: Option<String>,

    /// Directory holding `alarm.wav` and `silent.wav`
    pub sounds_dir: PathBuf,

    /// sysfs LED directory used as the strobe
    pub strobe_led: Option<PathBuf>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            sensitivity: Sensitivity::default(),
            flash_enabled: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            cooldown_ms: DEFAULT_COOLDOWN.as_millis() as u64,
            flash_duration_ms: DEFAULT_FLASH_DURATION.as_millis() as u64,
            keep_alive: false,
            input_device: None,
            sounds_dir: PathBuf::from("sounds"),
            strobe_led: None,
        }
    }
}

impl ListenerConfig {
    /// Load defaults, the JSON file (explicit path or `WHISTLE_CONFIG`), then
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);

        let mut config = match path.or(env_path.as_deref()) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read a JSON config file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading config from {}", path.display());

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `WHISTLE_*` overrides looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("WHISTLE_SENSITIVITY") {
            self.sensitivity = value.parse().map_err(|e| ConfigError::InvalidValue {
                field: "sensitivity",
                reason: format!("{}", e),
            })?;
        }

        if let Some(value) = lookup("WHISTLE_FLASH") {
            self.flash_enabled = parse_bool("flash_enabled", &value)?;
        }

        if let Some(value) = lookup("WHISTLE_KEEP_ALIVE") {
            self.keep_alive = parse_bool("keep_alive", &value)?;
        }

        if let Some(value) = lookup("WHISTLE_COOLDOWN_MS") {
            self.cooldown_ms = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "cooldown_ms",
                reason: format!("'{}' is not a whole number of milliseconds", value),
            })?;
        }

        if let Some(value) = lookup("WHISTLE_INPUT_DEVICE") {
            self.input_device = Some(value).filter(|name| !name.is_empty());
        }

        if let Some(value) = lookup("WHISTLE_SOUNDS_DIR") {
            self.sounds_dir = PathBuf::from(value);
        }

        if let Some(value) = lookup("WHISTLE_STROBE_LED") {
            self.strobe_led = Some(PathBuf::from(value)).filter(|p| !p.as_os_str().is_empty());
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "buffer_size",
                reason: format!("must be between 1 and {}", MAX_BUFFER_SIZE),
            });
        }

        if self.flash_duration_ms > MAX_FLASH_DURATION_MS {
            return Err(ConfigError::InvalidValue {
                field: "flash_duration_ms",
                reason: format!("must be at most {} ms", MAX_FLASH_DURATION_MS),
            });
        }

        if self.sounds_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sounds_dir",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn alert_config(&self) -> AlertConfig {
        AlertConfig {
            flash_enabled: self.flash_enabled,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn flash_duration(&self) -> Duration {
        Duration::from_millis(self.flash_duration_ms)
    }
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field,
            reason: format!("'{}' is not a boolean", other),
        }),
    }
}

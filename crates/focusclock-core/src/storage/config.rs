//! TOML-based application configuration.
//!
//! Stores:
//! - Default focus length and the label written to history
//! - Default countdown length
//! - Ticker cadences for the display and completion passes
//! - Remote store location and credentials
//!
//! Configuration is stored at `<data dir>/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusConfig {
    #[serde(default = "default_focus_minutes")]
    pub default_minutes: u32,
    /// Label stored on completed focus entries.
    #[serde(default = "default_focus_label")]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountdownConfig {
    #[serde(default = "default_countdown_seconds")]
    pub default_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerConfig {
    /// Display refresh cadence. Read-only pass.
    #[serde(default = "default_ui_refresh_ms")]
    pub ui_refresh_ms: u64,
    /// Completion check cadence. Must be at least one second.
    #[serde(default = "default_completion_check_ms")]
    pub completion_check_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the document store, e.g. `https://sync.example.com/v1/`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub focus: FocusConfig,
    #[serde(default)]
    pub countdown: CountdownConfig,
    #[serde(default)]
    pub ticker: TickerConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

fn default_focus_minutes() -> u32 {
    crate::state::DEFAULT_FOCUS_MINUTES
}
fn default_focus_label() -> String {
    "Focus".into()
}
fn default_countdown_seconds() -> u64 {
    crate::state::DEFAULT_COUNTDOWN_SECONDS
}
fn default_ui_refresh_ms() -> u64 {
    50
}
fn default_completion_check_ms() -> u64 {
    1000
}
fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            default_minutes: default_focus_minutes(),
            label: default_focus_label(),
        }
    }
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            default_seconds: default_countdown_seconds(),
        }
    }
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            ui_refresh_ms: default_ui_refresh_ms(),
            completion_check_ms: default_completion_check_ms(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl TickerConfig {
    pub fn ui_refresh(&self) -> Duration {
        Duration::from_millis(self.ui_refresh_ms)
    }

    pub fn completion_check(&self) -> Duration {
        Duration::from_millis(self.completion_check_ms)
    }
}

impl RemoteConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            focus: FocusConfig::default(),
            countdown: CountdownConfig::default(),
            ticker: TickerConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Null if value.is_empty() || value == "none" => {
                        serde_json::Value::Null
                    }
                    _ if value == "none" => serde_json::Value::Null,
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk, writing the defaults if no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config =
                    toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if self.focus.default_minutes == 0 {
            return Err(invalid("focus.default_minutes", "must be greater than zero"));
        }
        if self.countdown.default_seconds == 0 {
            return Err(invalid("countdown.default_seconds", "must be greater than zero"));
        }
        if self.ticker.ui_refresh_ms == 0 {
            return Err(invalid("ticker.ui_refresh_ms", "must be greater than zero"));
        }
        if self.ticker.completion_check_ms < 1000 {
            return Err(invalid("ticker.completion_check_ms", "must be at least 1000"));
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key in memory. Call [`Config::save`] to persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or fails validation.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("using default configuration: {e}");
            Self::default()
        })
    }
}

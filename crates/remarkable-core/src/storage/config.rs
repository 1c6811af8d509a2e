//! TOML-based application configuration.
//!
//! Holds the tunables for:
//! - Echo suppression and event-log history in the store
//! - Working hours used when suggesting conflict-free slots
//! - Remote id prefixes recognized during inbound sync
//! - The default log filter
//!
//! Configuration is stored at `~/.config/remarkable/config.toml`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;

/// Store-level tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How long a local write stays eligible for echo suppression
    #[serde(default = "default_suppression_window_secs")]
    pub suppression_window_secs: u64,
    /// Upper bound on remembered local writes
    #[serde(default = "default_pending_write_capacity")]
    pub pending_write_capacity: usize,
    /// Previous event-log versions kept per event
    #[serde(default = "default_event_log_version_limit")]
    pub event_log_version_limit: usize,
    /// Soft-deleted events older than this are eligible for purge
    #[serde(default = "default_purge_after_days")]
    pub purge_after_days: u32,
}

/// Working hours for alternative slot suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictsConfig {
    #[serde(default = "default_work_day_start_hour")]
    pub work_day_start_hour: u32,
    #[serde(default = "default_work_day_end_hour")]
    pub work_day_end_hour: u32,
    #[serde(default = "default_slot_step_minutes")]
    pub slot_step_minutes: u32,
}

/// Remote calendar settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSyncConfig {
    /// Provider prefixes stripped before matching remote ids
    #[serde(default = "default_remote_id_prefixes")]
    pub remote_id_prefixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/remarkable/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub conflicts: ConflictsConfig,
    #[serde(default)]
    pub sync: RemoteSyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_suppression_window_secs() -> u64 {
    5
}
fn default_pending_write_capacity() -> usize {
    256
}
fn default_event_log_version_limit() -> usize {
    50
}
fn default_purge_after_days() -> u32 {
    30
}
fn default_work_day_start_hour() -> u32 {
    9
}
fn default_work_day_end_hour() -> u32 {
    18
}
fn default_slot_step_minutes() -> u32 {
    30
}
fn default_remote_id_prefixes() -> Vec<String> {
    vec!["outlook-".into(), "google-".into(), "icloud-".into()]
}
fn default_log_filter() -> String {
    "info".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            suppression_window_secs: default_suppression_window_secs(),
            pending_write_capacity: default_pending_write_capacity(),
            event_log_version_limit: default_event_log_version_limit(),
            purge_after_days: default_purge_after_days(),
        }
    }
}

impl Default for ConflictsConfig {
    fn default() -> Self {
        Self {
            work_day_start_hour: default_work_day_start_hour(),
            work_day_end_hour: default_work_day_end_hour(),
            slot_step_minutes: default_slot_step_minutes(),
        }
    }
}

impl Default for RemoteSyncConfig {
    fn default() -> Self {
        Self {
            remote_id_prefixes: default_remote_id_prefixes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            conflicts: ConflictsConfig::default(),
            sync: RemoteSyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(root: &mut Value, key: &str, value: &str) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    Value::Bool(_) => Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    Value::Number(_) => Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                    Value::Array(_) => match serde_json::from_str(value) {
                        Ok(parsed @ Value::Array(_)) => parsed,
                        // Comma-separated shorthand for string lists.
                        _ => Value::Array(
                            value
                                .split(',')
                                .map(str::trim)
                                .filter(|s| !s.is_empty())
                                .map(|s| Value::String(s.to_string()))
                                .collect(),
                        ),
                    },
                    Value::Object(_) => return Err(invalid("cannot overwrite a section".into())),
                    _ => Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// `<data_dir>/config.toml`
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there when the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
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

    /// Like [`Config::load`] but falls back to defaults on any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "using default configuration");
            Self::default()
        })
    }

    /// Persist to the default location.
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
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key. The value is parsed to the
    /// type of the existing entry. Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Every leaf as `(dot.path, value)`, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            flatten("", &json, &mut out);
        }
        out
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out);
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

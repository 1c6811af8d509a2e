//! On-disk state: configuration, SQLite persistence and the device id.

mod config;
pub mod device_id;
pub mod sqlite;

pub use config::{Config, ConflictsConfig, LoggingConfig, RemoteSyncConfig, StoreConfig};
pub use device_id::{get_or_create_device_id, get_or_create_device_id_at};
pub use sqlite::SqlitePersistence;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/remarkable[-dev]/`.
///
/// `REMARKABLE_DATA_DIR` overrides the location entirely; otherwise
/// `REMARKABLE_ENV=dev` selects the development directory.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("REMARKABLE_DATA_DIR") {
        Some(explicit) if !explicit.is_empty() => PathBuf::from(explicit),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("REMARKABLE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("remarkable-dev")
            } else {
                base_dir.join("remarkable")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::NoDataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

// Device ID used as the broadcast sender identity.
// Format: "remarkable-<uuid>"

use std::fs;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

use super::data_dir;
use crate::error::{ConfigError, CoreError, Result};

const DEVICE_ID_FILE: &str = "device_id.txt";
const DEVICE_ID_PREFIX: &str = "remarkable-";

/// Get or create the device ID stored under `path`.
///
/// # Returns
/// Device ID string in format "remarkable-<uuid>"
pub fn get_or_create_device_id_at(path: &Path) -> Result<String> {
    let device_id_path = path.join(DEVICE_ID_FILE);

    if device_id_path.exists() {
        let content = fs::read_to_string(&device_id_path)?;
        let device_id = content.trim().to_string();

        if device_id.starts_with(DEVICE_ID_PREFIX) {
            return Ok(device_id);
        }
        return Err(CoreError::Config(ConfigError::InvalidValue {
            key: DEVICE_ID_FILE.to_string(),
            message: format!("'{device_id}' is not a device id"),
        }));
    }

    let device_id = format!("{}{}", DEVICE_ID_PREFIX, Uuid::new_v4());

    if !path.exists() {
        fs::create_dir_all(path)?;
    }

    let mut file = fs::File::create(&device_id_path)?;
    writeln!(file, "{}", device_id)?;
    tracing::info!(target: "remarkable::broadcast", %device_id, "created device id");

    Ok(device_id)
}

/// Get or create the device ID in [`data_dir`].
pub fn get_or_create_device_id() -> Result<String> {
    get_or_create_device_id_at(&data_dir()?)
}

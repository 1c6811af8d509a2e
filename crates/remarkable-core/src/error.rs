//! Core error types for remarkable-core.
//!
//! Store operations surface `Validation`, `NotFound` and `InvalidOperation`
//! synchronously. Remote calendar failures are wrapped in [`RemoteSyncError`]
//! at the reconciliation boundary and never escape a local write.

use std::path::PathBuf;
use thiserror::Error;

use chrono::NaiveDateTime;

/// Core error type for remarkable-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Time-field rules violated; nothing was persisted.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Operation targeted an id that does not exist.
    #[error("Event not found: {id}")]
    NotFound { id: String },

    /// Operation is well-formed but not allowed in the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Failure reported by the remote calendar capability.
    #[error("Remote sync error: {0}")]
    RemoteSync(#[from] RemoteSyncError),

    /// Persistence-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        CoreError::NotFound { id: id.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        CoreError::InvalidOperation(message.into())
    }
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A non-task event is missing one of its time bounds
    #[error("Missing required time field '{field}' for a non-task event")]
    MissingTime { field: &'static str },

    /// Invalid time range
    #[error("Invalid time range: start_time ({start}) must not be after end_time ({end})")]
    InvalidTimeRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Persistence-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored record could not be decoded
    #[error("Stored record '{id}' is corrupt: {message}")]
    Corrupt { id: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Remote calendar failure, tagged with the event and calendar it concerned.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{operation} on calendar '{calendar_id}' for event '{event_id}' failed: {message}")]
pub struct RemoteSyncError {
    pub event_id: String,
    pub calendar_id: String,
    pub operation: RemoteOperation,
    pub message: String,
}

/// Which remote call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RemoteOperation::Create => "create",
            RemoteOperation::Update => "update",
            RemoteOperation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Could not determine where configuration lives
    #[error("Could not determine data directory: {0}")]
    NoDataDir(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

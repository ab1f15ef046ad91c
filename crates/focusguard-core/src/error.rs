//! Core error types for focusguard-core.
//!
//! This module defines the error hierarchy using thiserror. Every failure in
//! the subsystem is non-fatal to the user's flow: callers log and fail open.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focusguard-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The persistence layer could not be opened. Callers degrade to an
    /// in-memory, non-durable store.
    #[error("Storage unavailable at {path}: {message}")]
    StorageUnavailable { path: PathBuf, message: String },

    /// A record with this id already exists. Ids are generated to be unique,
    /// so this signals a logic error in the caller.
    #[error("Duplicate id '{id}' in {collection}")]
    DuplicateId { collection: String, id: String },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Notification delivery errors
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    /// Web sync errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Intervention gate errors
    #[error("Intervention error: {0}")]
    Gate(#[from] GateError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
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

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Could not resolve the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Notification-specific errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// The user has not granted notification permission
    #[error("Notifications not permitted")]
    PermissionDenied,

    /// No notification channel is available on this platform
    #[error("Notifications are not supported")]
    NotSupported,

    /// Every available channel failed to deliver
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Web sync errors. Always logged and retried on the next window.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Endpoint, user id or api key missing
    #[error("Sync is not configured: {0}")]
    NotConfigured(String),

    /// Transport failure
    #[error("Sync request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Sync endpoint returned HTTP {status}")]
    Status { status: u16 },

    /// Credential storage failure
    #[error("Credential store error: {0}")]
    Credentials(String),
}

/// Intervention gate errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Skip was requested before the affordance became available
    #[error("Skip is not available yet ({remaining_secs}s remaining)")]
    SkipUnavailable { remaining_secs: u64 },

    /// Skip is disabled in settings
    #[error("Skipping is disabled")]
    SkipDisabled,

    /// Completion was reported before the countdown reached zero
    #[error("Intervention still running ({remaining_secs}s remaining)")]
    StillRunning { remaining_secs: u64 },

    /// The session is not in the running state
    #[error("Intervention is not running")]
    NotRunning,

    /// No gate is running for the given origin
    #[error("No intervention running for origin '{0}'")]
    NoActiveGate(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Empty identifier
    #[error("Identifier must not be empty")]
    EmptyIdentifier,

    /// Duplicate entry in a list that must be unique
    #[error("Duplicate entry '{0}'")]
    DuplicateEntry(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) if e.code == rusqlite::ErrorCode::DatabaseBusy => {
                DatabaseError::Locked
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::InvalidValue {
            key: "<file>".into(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

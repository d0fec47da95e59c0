//! Core error types for focusclock-core.
//!
//! Every failure in the engine degrades to "state may be stale or
//! local-only"; these types exist so callers can report what happened,
//! not so they can abort.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focusclock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistence-related errors (local database or remote store)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

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

/// Errors raised by a persistence backend or the history log.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure in the local store
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to open the database file
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Transport failure talking to the remote store
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote store answered with a non-success status
    #[error("Remote store returned {code} for {path}")]
    Status { code: u16, path: String },

    /// Invalid remote URL
    #[error("Invalid remote URL: {0}")]
    Url(#[from] url::ParseError),

    /// Stored document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    TaskJoin(String),

    /// Backend cannot serve requests right now
    #[error("Store unavailable: {0}")]
    Unavailable(String),
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

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors for user actions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Focus duration can only change while idle
    #[error("Focus duration cannot change while a session is running")]
    FocusRunning,
}

impl ValidationError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::TaskJoin(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

//! TableSync Error Types

use thiserror::Error;

/// Result type alias for TableSync operations
pub type Result<T> = std::result::Result<T, Error>;

/// TableSync error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("data sharing is disabled on this instance")]
    SyncDisabled,

    #[error("syncer not found for {0}")]
    TableNotRegistered(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("error in fetching sync history for {table}: {reason}")]
    CursorResolution { table: String, reason: String },

    #[error("error appending synced {table} records: {reason}")]
    Persistence { table: String, reason: String },

    // Wire errors
    #[error("error in fetching data for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("sync error, {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Network(_))
    }
}

//! Error types for lifeledger-core

use thiserror::Error;

/// Main error type for the lifeledger-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence backend error (non-SQLite backends)
    #[error("backend error: {0}")]
    Backend(String),

    /// Snapshot import/export error
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Record rejected by shape validation
    #[error("invalid {collection} record: {reason}")]
    InvalidRecord { collection: String, reason: String },

    /// Record not found in a collection
    #[error("{collection} record not found: {id}")]
    NotFound { collection: String, id: String },
}

/// Result type alias for lifeledger-core
pub type Result<T> = std::result::Result<T, Error>;

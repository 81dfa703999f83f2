//! Error types for feedwatch.

use thiserror::Error;

/// Common error type for feedwatch.
#[derive(Error, Debug)]
pub enum FeedwatchError {
    /// Database error.
    ///
    /// Wraps errors from the storage backend; sqlx errors are converted
    /// automatically.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Feed retrieval error (network failure, non-2xx status, oversized body).
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Feed body could not be parsed as RSS/Atom.
    #[error("parse error: {0}")]
    Parse(String),

    /// Validation error for user-supplied values.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

// Conversion from sqlx errors
impl From<sqlx::Error> for FeedwatchError {
    fn from(e: sqlx::Error) -> Self {
        FeedwatchError::Database(e.to_string())
    }
}

/// Result type alias for feedwatch operations.
pub type Result<T> = std::result::Result<T, FeedwatchError>;

//! Error types for rssfeed.

use thiserror::Error;

/// Common error type for rssfeed.
#[derive(Error, Debug)]
pub enum RssfeedError {
    /// Database error.
    ///
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// The feed document could not be fetched or parsed.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// A single entry could not be stored.
    #[error("entry persistence error: {0}")]
    EntryPersistence(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for RssfeedError {
    fn from(e: sqlx::Error) -> Self {
        RssfeedError::Database(e.to_string())
    }
}

/// Result type alias for rssfeed operations.
pub type Result<T> = std::result::Result<T, RssfeedError>;

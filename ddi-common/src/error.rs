//! Common error types for the DDI services

use thiserror::Error;

/// Common result type for DDI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across DDI crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Entity failed model-level validation
    #[error("Validation failed for {entity}: {message}")]
    Validation { entity: String, message: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a validation failure on `entity`
    pub fn validation(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// True for SQLite lock contention, which is worth retrying
    pub fn is_lock_error(&self) -> bool {
        match self {
            Error::Database(db_err) => db_err.to_string().contains("database is locked"),
            _ => false,
        }
    }
}

//! Import error types
//!
//! Row-level errors are logged by the importer and the batch continues.
//! [`ImportError::UnresolvedRelation`] aborts the batch of a relation
//! importer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    /// A single record could not be imported
    #[error("{entity}: {message}")]
    Row { entity: String, message: String },

    /// Required column or field absent or empty
    #[error("{entity}: missing required field '{field}'")]
    MissingField { entity: String, field: String },

    /// A relation endpoint does not exist
    #[error("{entity}: cannot relate {origin} to {target}: referenced entity not found")]
    UnresolvedRelation {
        entity: String,
        origin: String,
        target: String,
    },

    /// Source file does not exist
    #[error("Import source not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("Invalid file pattern: {0}")]
    Pattern(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] ddi_common::Error),
}

impl ImportError {
    pub fn row(entity: &str, message: impl Into<String>) -> Self {
        ImportError::Row {
            entity: entity.to_string(),
            message: message.into(),
        }
    }

    pub fn missing_field(entity: &str, field: &str) -> Self {
        ImportError::MissingField {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }

    pub fn unresolved(entity: &str, origin: impl Into<String>, target: impl Into<String>) -> Self {
        ImportError::UnresolvedRelation {
            entity: entity.to_string(),
            origin: origin.into(),
            target: target.into(),
        }
    }
}

//! Search error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Search API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Unknown document type: {0}")]
    UnknownDocumentType(String),

    /// Bulk request accepted but some items were rejected
    #[error("Bulk indexing into {index} rejected {failed} documents")]
    BulkRejected { index: String, failed: usize },

    #[error(transparent)]
    Store(#[from] ddi_common::Error),
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Parse(err.to_string())
    }
}

//! Search backend abstraction

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// A document ready for indexing: id plus body
pub type Document = (Uuid, Value);

/// Storage for search documents, one named index per document type
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Create `index` with the given settings/mappings body
    async fn create_index(&self, index: &str, body: &Value) -> Result<()>;

    /// Delete `index`; returns false when it did not exist
    async fn delete_index(&self, index: &str) -> Result<bool>;

    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Index many documents in one request; returns the number indexed
    async fn bulk_index(&self, index: &str, documents: Vec<Document>) -> Result<usize>;

    /// Index or replace one document
    async fn put_document(&self, index: &str, id: Uuid, document: &Value) -> Result<()>;

    /// Remove one document; returns false when it was not indexed
    async fn delete_document(&self, index: &str, id: Uuid) -> Result<bool>;

    async fn get_document(&self, index: &str, id: Uuid) -> Result<Option<Value>>;

    /// Number of documents in `index`
    async fn count(&self, index: &str) -> Result<u64>;
}

//! In-process search backend
//!
//! Keeps documents in ordered maps. Used by tests and when no search
//! server is configured.

use crate::backend::{Document, SearchBackend};
use crate::{Result, SearchError};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryIndex {
    indices: RwLock<HashMap<String, IndexMap<Uuid, Value>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all documents in `index`
    pub async fn documents(&self, index: &str) -> Vec<Document> {
        self.indices
            .read()
            .await
            .get(index)
            .map(|docs| docs.iter().map(|(id, doc)| (*id, doc.clone())).collect())
            .unwrap_or_default()
    }

    /// Names of the existing indices
    pub async fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl SearchBackend for MemoryIndex {
    async fn create_index(&self, index: &str, _body: &Value) -> Result<()> {
        self.indices
            .write()
            .await
            .entry(index.to_string())
            .or_default();
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<bool> {
        Ok(self.indices.write().await.remove(index).is_some())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.indices.read().await.contains_key(index))
    }

    async fn bulk_index(&self, index: &str, documents: Vec<Document>) -> Result<usize> {
        let mut indices = self.indices.write().await;
        let docs = indices
            .get_mut(index)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))?;

        let count = documents.len();
        docs.extend(documents);
        Ok(count)
    }

    async fn put_document(&self, index: &str, id: Uuid, document: &Value) -> Result<()> {
        self.bulk_index(index, vec![(id, document.clone())]).await?;
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: Uuid) -> Result<bool> {
        let mut indices = self.indices.write().await;
        let docs = indices
            .get_mut(index)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))?;
        Ok(docs.shift_remove(&id).is_some())
    }

    async fn get_document(&self, index: &str, id: Uuid) -> Result<Option<Value>> {
        Ok(self
            .indices
            .read()
            .await
            .get(index)
            .and_then(|docs| docs.get(&id).cloned()))
    }

    async fn count(&self, index: &str) -> Result<u64> {
        self.indices
            .read()
            .await
            .get(index)
            .map(|docs| docs.len() as u64)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))
    }
}

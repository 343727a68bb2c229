//! Index lifecycle and bulk re-indexing
//!
//! Index names are `<prefix>.<document type>`. A rebuild pages through the
//! source table, preloads the related rows of each page once, and sends the
//! page as one bulk request.

use crate::backend::{Document, SearchBackend};
use crate::documents::{DocumentType, Related};
use crate::{Result, SearchError};
use ddi_common::db::store::{record_uuid, Filter, Store};
use ddi_common::db::tables::table_by_name;
use ddi_common::Error;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Source rows per bulk request
pub const BULK_PAGE_SIZE: usize = 1000;

#[derive(Clone)]
pub struct SearchIndexer {
    store: Arc<dyn Store>,
    backend: Arc<dyn SearchBackend>,
    prefix: String,
}

impl SearchIndexer {
    pub fn new(store: Arc<dyn Store>, backend: Arc<dyn SearchBackend>, prefix: &str) -> Self {
        Self {
            store,
            backend,
            prefix: prefix.to_string(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub fn index_name(&self, doc_type: DocumentType) -> String {
        format!("{}.{}", self.prefix, doc_type.as_str())
    }

    /// Create missing indices
    pub async fn create(&self, types: &[DocumentType]) -> Result<()> {
        for doc_type in types {
            let index = self.index_name(*doc_type);
            if self.backend.index_exists(&index).await? {
                debug!(index = %index, "Index already exists");
                continue;
            }
            self.backend.create_index(&index, &doc_type.mapping()).await?;
            info!(index = %index, "Created search index");
        }
        Ok(())
    }

    /// Delete indices; missing ones are ignored
    pub async fn delete(&self, types: &[DocumentType]) -> Result<()> {
        for doc_type in types {
            let index = self.index_name(*doc_type);
            if self.backend.delete_index(&index).await? {
                info!(index = %index, "Deleted search index");
            }
        }
        Ok(())
    }

    /// Delete and recreate indices empty
    pub async fn reset(&self, types: &[DocumentType]) -> Result<()> {
        self.delete(types).await?;
        self.create(types).await
    }

    /// Reset indices and index every source row; returns documents indexed
    pub async fn rebuild(&self, types: &[DocumentType]) -> Result<usize> {
        self.reset(types).await?;

        let mut total = 0;
        for doc_type in types {
            let count = self.index_all(*doc_type).await?;
            info!(index = %self.index_name(*doc_type), documents = count, "Index rebuilt");
            total += count;
        }
        Ok(total)
    }

    /// Index every row of the type's source table into an existing index
    pub async fn index_all(&self, doc_type: DocumentType) -> Result<usize> {
        let table = source_table(doc_type)?;
        let index = self.index_name(doc_type);
        let mut offset = 0;
        let mut indexed = 0;

        loop {
            let filter = Filter::new()
                .order_by("id")
                .limit(BULK_PAGE_SIZE)
                .offset(offset);
            let records = self.store.select(table, &filter).await?;
            if records.is_empty() {
                break;
            }
            offset += records.len();

            let related = Related::load(self.store.as_ref(), doc_type, &records).await?;
            let documents: Vec<Document> = records
                .iter()
                .filter_map(|r| record_uuid(r, "id").map(|id| (id, doc_type.build(r, &related))))
                .collect();
            indexed += self.backend.bulk_index(&index, documents).await?;

            if offset % (BULK_PAGE_SIZE * 10) == 0 {
                debug!(index = %index, indexed, "Bulk indexing progress");
            }
        }

        Ok(indexed)
    }

    /// Build documents for specific rows without indexing them
    pub async fn build_documents(&self, doc_type: DocumentType, ids: &[Uuid]) -> Result<Vec<Document>> {
        let table = source_table(doc_type)?;
        let records = self
            .store
            .select(table, &Filter::new().any_of("id", ids.iter().copied()))
            .await?;
        let related = Related::load(self.store.as_ref(), doc_type, &records).await?;

        Ok(records
            .iter()
            .filter_map(|r| record_uuid(r, "id").map(|id| (id, doc_type.build(r, &related))))
            .collect())
    }

    /// Re-index specific rows; ids no longer in the store are removed
    ///
    /// Returns (indexed, removed).
    pub async fn index_entities(&self, doc_type: DocumentType, ids: &[Uuid]) -> Result<(usize, usize)> {
        let index = self.index_name(doc_type);
        let documents = self.build_documents(doc_type, ids).await?;

        let mut removed = 0;
        for id in ids {
            if !documents.iter().any(|(doc_id, _)| doc_id == id)
                && self.backend.delete_document(&index, *id).await?
            {
                removed += 1;
            }
        }

        let indexed = self.backend.bulk_index(&index, documents).await?;
        Ok((indexed, removed))
    }

    /// Remove one document
    pub async fn remove_entity(&self, doc_type: DocumentType, id: Uuid) -> Result<bool> {
        self.backend
            .delete_document(&self.index_name(doc_type), id)
            .await
    }
}

fn source_table(doc_type: DocumentType) -> Result<&'static ddi_common::db::schema::Table> {
    table_by_name(doc_type.source_table()).ok_or_else(|| {
        SearchError::from(Error::Internal(format!("no table for document type {}", doc_type)))
    })
}

//! Event-driven index synchronization
//!
//! Listens on the catalog event bus and re-indexes single entities after
//! they change. Index failures are logged and dropped; a rebuild is the
//! remedy for anything missed.

use crate::documents::DocumentType;
use crate::indexer::SearchIndexer;
use ddi_common::events::{DdiEvent, EventBus};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct IndexSynchronizer {
    indexer: SearchIndexer,
}

impl IndexSynchronizer {
    pub fn new(indexer: SearchIndexer) -> Self {
        Self { indexer }
    }

    /// Subscribe to `bus` and process events on a background task
    ///
    /// The task ends when every sender of the bus is dropped.
    pub fn spawn(self, bus: &EventBus) -> JoinHandle<()> {
        let rx = bus.subscribe();
        tokio::spawn(async move { self.run(rx).await })
    }

    pub async fn run(&self, mut rx: broadcast::Receiver<DdiEvent>) {
        debug!("Index synchronizer started");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    self.handle(&event).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        skipped,
                        "Index synchronizer lagged; skipped entities stay stale until the next rebuild"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        debug!("Index synchronizer stopped");
    }

    /// Apply one event to the index; returns whether it touched the index
    pub async fn handle(&self, event: &DdiEvent) -> bool {
        match event {
            DdiEvent::EntityChanged { table, id } => {
                let Some(doc_type) = DocumentType::for_table(table) else {
                    return false;
                };
                match self.indexer.index_entities(doc_type, &[*id]).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(table = %table, id = %id, error = %e, "Failed to index entity");
                        false
                    }
                }
            }
            DdiEvent::EntityDeleted { table, id } => {
                let Some(doc_type) = DocumentType::for_table(table) else {
                    return false;
                };
                match self.indexer.remove_entity(doc_type, *id).await {
                    Ok(removed) => removed,
                    Err(e) => {
                        warn!(table = %table, id = %id, error = %e, "Failed to remove indexed entity");
                        false
                    }
                }
            }
            _ => false,
        }
    }
}

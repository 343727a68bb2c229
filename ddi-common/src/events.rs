//! Event types and the in-process event bus
//!
//! Importers announce every write to an indexed table here; the search
//! synchronizer and the import run tracker subscribe.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Catalog events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DdiEvent {
    /// A row was created or updated
    EntityChanged {
        /// Table the row lives in
        table: String,
        id: Uuid,
    },

    /// A row was deleted
    EntityDeleted { table: String, id: Uuid },

    /// An orchestrated import started
    ImportRunStarted {
        run_id: Uuid,
        study: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One entity job of a run reached a terminal state
    ImportJobFinished {
        run_id: Uuid,
        study: String,
        entity: String,
        /// Terminal job state (`completed`, `failed`, `skipped`)
        state: String,
        imported: usize,
        failed: usize,
    },

    /// An orchestrated import finished
    ImportRunFinished {
        run_id: Uuid,
        study: String,
        /// Final run state (`completed`, `partial`, `failed`)
        state: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A repository checkout moved to a new commit
    RepositoryUpdated {
        /// Study name, or `None` for the system repository
        study: Option<String>,
        commit: String,
    },
}

impl DdiEvent {
    /// Shorthand for `EntityChanged`
    pub fn changed(table: &str, id: Uuid) -> Self {
        DdiEvent::EntityChanged {
            table: table.to_string(),
            id,
        }
    }

    /// Shorthand for `EntityDeleted`
    pub fn deleted(table: &str, id: Uuid) -> Self {
        DdiEvent::EntityDeleted {
            table: table.to_string(),
            id,
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper around `tokio::sync::broadcast`. Slow subscribers lag and
/// lose the oldest events rather than blocking writers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DdiEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// ```
    /// use ddi_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(1000);
    /// assert_eq!(event_bus.capacity(), 1000);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DdiEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: DdiEvent) -> Result<usize, broadcast::error::SendError<DdiEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DdiEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_changes() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        bus.emit(DdiEvent::changed("variables", id)).unwrap();

        match rx.recv().await.unwrap() {
            DdiEvent::EntityChanged { table, id: got } => {
                assert_eq!(table, "variables");
                assert_eq!(got, id);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        assert!(bus.emit(DdiEvent::deleted("studies", Uuid::nil())).is_err());
        // lossy emit never fails
        bus.emit_lossy(DdiEvent::deleted("studies", Uuid::nil()));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(DdiEvent::changed("concepts", Uuid::nil())).unwrap();
        assert_eq!(json["type"], "EntityChanged");
        assert_eq!(json["table"], "concepts");
    }
}

//! Persistence: table definitions, storage backends, repositories

pub mod cascade;
pub mod init;
pub mod memory;
pub mod repository;
pub mod retry;
pub mod schema;
pub mod schema_sync;
pub mod sqlite;
pub mod store;
pub mod tables;

pub use init::{init_database, init_memory_database};
pub use memory::MemoryStore;
pub use repository::Repository;
pub use sqlite::SqliteStore;
pub use store::{Filter, Record, Store, WriteBatch};

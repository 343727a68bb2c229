//! # DDI Search
//!
//! Search documents for concepts, topics, variables, questions and
//! publications, the backends that store them, and the machinery that keeps
//! them in step with the relational catalog:
//! - [`SearchIndexer`] builds documents in bulk and manages index lifecycle
//! - [`IndexSynchronizer`] re-indexes single entities from catalog events
//!
//! The index is never the source of truth; a rebuild restores it from the
//! store at any time.

pub mod backend;
pub mod documents;
pub mod elasticsearch;
pub mod error;
pub mod indexer;
pub mod memory;
pub mod sync;

pub use backend::SearchBackend;
pub use documents::DocumentType;
pub use elasticsearch::ElasticsearchBackend;
pub use error::{Result, SearchError};
pub use indexer::SearchIndexer;
pub use memory::MemoryIndex;
pub use sync::IndexSynchronizer;

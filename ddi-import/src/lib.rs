//! # DDI Import
//!
//! Bulk import of study metadata from Git-hosted repositories.
//!
//! **Pipeline:**
//! 1. [`git::GitRepository`] pulls or clones the study repository
//! 2. [`manager::StudyImportManager`] resolves the source files of each
//!    entity type and dispatches one job per file to the [`queue::JobQueue`],
//!    wiring each job to wait for the entity types it depends on
//! 3. The per-entity [`importers`] map rows to catalog entities, deriving
//!    every id from names so repeated imports update in place
//! 4. Each run is recorded as an [`ImportRun`](ddi_common::models::ImportRun)

pub mod cli;
pub mod context;
pub mod error;
pub mod git;
pub mod importers;
pub mod manager;
pub mod queue;
pub mod runs;
pub mod study_admin;
pub mod tabular;

pub use context::ImportContext;
pub use error::ImportError;
pub use importers::ImportReport;
pub use manager::StudyImportManager;
pub use queue::{JobHandle, JobOutcome, JobQueue};

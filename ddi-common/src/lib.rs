//! # DDI Common Library
//!
//! Shared code for the DDI catalog services:
//! - Deterministic identifier derivation (UUIDv5 namespaces)
//! - Entity models and their declarative table schemas
//! - Storage backends (SQLite, in-memory) behind the `Store` trait
//! - Configuration loading
//! - Event bus used to keep the search index in sync

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ids;
pub mod models;
pub mod topic_tree;

pub use error::{Error, Result};
pub use ids::{derive_id, IdDeriver};

//! Study and the system repository record

use super::{validate_name, Entity};
use crate::db::schema::Table;
use crate::db::tables;
use crate::ids::{normalize_name, IdDeriver};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Id of the singleton system row
pub const SYSTEM_ID: Uuid = Uuid::nil();

/// Top-level namespace for all study-scoped entities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Study {
    pub id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub description: String,
    pub doi: String,
    /// Git URL of the study's metadata repository
    pub repo: String,
    /// Last imported commit
    pub current_commit: Option<String>,
    /// Free-form study settings from study.json
    pub config: Value,
}

impl Study {
    pub fn new(ids: &IdDeriver, name: &str) -> Self {
        Self {
            id: ids.study(name),
            name: normalize_name(name),
            ..Default::default()
        }
    }

    /// Display title: label, falling back to the name
    pub fn title(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

impl Entity for Study {
    fn table() -> &'static Table {
        &tables::STUDIES
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("study", &self.name)
    }
}

/// Watermark for the system repository (studies.csv)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct System {
    pub id: Uuid,
    pub name: String,
    pub repo: String,
    pub current_commit: Option<String>,
}

impl Default for System {
    fn default() -> Self {
        Self {
            id: SYSTEM_ID,
            name: "system".to_string(),
            repo: String::new(),
            current_commit: None,
        }
    }
}

impl Entity for System {
    fn table() -> &'static Table {
        &tables::SYSTEM
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

//! Datasets, variables and variable lineage

use super::{validate_name, Entity};
use crate::db::schema::Table;
use crate::db::tables;
use crate::ids::{normalize_name, IdDeriver};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub description: String,
    pub folder: String,
    /// Key variables of the dataset (JSON list of names)
    pub primary_key: Value,
    pub period_id: Option<Uuid>,
    pub analysis_unit_id: Option<Uuid>,
    pub conceptual_dataset_id: Option<Uuid>,
}

impl Dataset {
    pub fn new(ids: &IdDeriver, study_id: Uuid, name: &str) -> Self {
        Self {
            id: ids.child(study_id, name),
            study_id,
            name: normalize_name(name),
            ..Default::default()
        }
    }
}

impl Entity for Dataset {
    fn table() -> &'static Table {
        &tables::DATASETS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("dataset", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Variable {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub description: String,
    pub description_long: String,
    pub concept_id: Option<Uuid>,
    pub period_id: Option<Uuid>,
    /// Value labels and frequencies
    pub categories: Value,
    /// Summary statistics
    pub statistics: Value,
    pub scale: String,
    pub sort_id: i64,
    pub image_url: Option<String>,
}

impl Variable {
    pub fn new(ids: &IdDeriver, dataset_id: Uuid, name: &str) -> Self {
        Self {
            id: ids.child(dataset_id, name),
            dataset_id,
            name: normalize_name(name),
            ..Default::default()
        }
    }
}

impl Entity for Variable {
    fn table() -> &'static Table {
        &tables::VARIABLES
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("variable", &self.name)
    }
}

/// Directed lineage edge origin → target, unique per ordered pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transformation {
    pub id: Uuid,
    pub origin_id: Uuid,
    pub target_id: Uuid,
}

impl Transformation {
    pub fn new(ids: &IdDeriver, origin_id: Uuid, target_id: Uuid) -> Self {
        Self {
            id: ids.relation("transformation", origin_id, target_id),
            origin_id,
            target_id,
        }
    }
}

impl Entity for Transformation {
    fn table() -> &'static Table {
        &tables::TRANSFORMATIONS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        if self.origin_id.is_nil() || self.target_id.is_nil() {
            return Err(Error::validation("transformation", "origin and target are required"));
        }
        Ok(())
    }
}

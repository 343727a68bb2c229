//! Shared vocabulary: topics, concepts, periods, analysis units,
//! conceptual datasets

use super::{validate_name, Entity};
use crate::db::schema::Table;
use crate::db::tables;
use crate::ids::{normalize_name, IdDeriver};
use crate::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Study-scoped topic; topics form a tree through `parent_id`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topic {
    pub id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub description: String,
    pub description_de: String,
    pub parent_id: Option<Uuid>,
}

impl Topic {
    pub fn new(ids: &IdDeriver, study_id: Uuid, name: &str) -> Self {
        Self {
            id: ids.child(study_id, name),
            study_id,
            name: normalize_name(name),
            ..Default::default()
        }
    }
}

impl Entity for Topic {
    fn table() -> &'static Table {
        &tables::TOPICS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("topic", &self.name)?;
        if self.parent_id == Some(self.id) {
            return Err(crate::Error::validation("topic", "topic cannot be its own parent"));
        }
        Ok(())
    }
}

/// Study-independent concept
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Concept {
    pub id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub description: String,
    pub description_de: String,
}

impl Concept {
    pub fn new(ids: &IdDeriver, name: &str) -> Self {
        Self {
            id: ids.concept(name),
            name: normalize_name(name),
            ..Default::default()
        }
    }
}

impl Entity for Concept {
    fn table() -> &'static Table {
        &tables::CONCEPTS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("concept", &self.name)
    }
}

/// Concept ↔ topic link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptTopic {
    pub id: Uuid,
    pub concept_id: Uuid,
    pub topic_id: Uuid,
}

impl ConceptTopic {
    pub fn new(ids: &IdDeriver, concept_id: Uuid, topic_id: Uuid) -> Self {
        Self {
            id: ids.relation("concept_topic", concept_id, topic_id),
            concept_id,
            topic_id,
        }
    }
}

impl Entity for ConceptTopic {
    fn table() -> &'static Table {
        &tables::CONCEPT_TOPICS
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Period {
    pub id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub description: String,
    pub definition: String,
}

impl Period {
    pub fn new(ids: &IdDeriver, study_id: Uuid, name: &str) -> Self {
        Self {
            id: ids.child(study_id, name),
            study_id,
            name: normalize_name(name),
            ..Default::default()
        }
    }
}

impl Entity for Period {
    fn table() -> &'static Table {
        &tables::PERIODS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("period", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisUnit {
    pub id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub description: String,
}

impl AnalysisUnit {
    pub fn new(ids: &IdDeriver, study_id: Uuid, name: &str) -> Self {
        Self {
            id: ids.child(study_id, name),
            study_id,
            name: normalize_name(name),
            ..Default::default()
        }
    }
}

impl Entity for AnalysisUnit {
    fn table() -> &'static Table {
        &tables::ANALYSIS_UNITS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("analysis_unit", &self.name)
    }
}

/// Root-level vocabulary shared between studies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptualDataset {
    pub id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub description: String,
}

impl ConceptualDataset {
    pub fn new(ids: &IdDeriver, name: &str) -> Self {
        Self {
            id: ids.conceptual_dataset(name),
            name: normalize_name(name),
            ..Default::default()
        }
    }
}

impl Entity for ConceptualDataset {
    fn table() -> &'static Table {
        &tables::CONCEPTUAL_DATASETS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("conceptual_dataset", &self.name)
    }
}

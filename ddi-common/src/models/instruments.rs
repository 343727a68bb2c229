//! Survey instruments: instrument → question → item, shared answers, and
//! the relation rows linking questions to variables and concepts

use super::{validate_name, Entity};
use crate::db::schema::Table;
use crate::db::tables;
use crate::ids::{normalize_name, IdDeriver};
use crate::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Instrument {
    pub id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub description: String,
    /// Instrument type (questionnaire, ...)
    pub kind: String,
    /// Survey mode (CAPI, PAPI, ...)
    pub mode: String,
    pub period_id: Option<Uuid>,
    pub analysis_unit_id: Option<Uuid>,
}

impl Instrument {
    pub fn new(ids: &IdDeriver, study_id: Uuid, name: &str) -> Self {
        Self {
            id: ids.child(study_id, name),
            study_id,
            name: normalize_name(name),
            ..Default::default()
        }
    }
}

impl Entity for Instrument {
    fn table() -> &'static Table {
        &tables::INSTRUMENTS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("instrument", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Question {
    pub id: Uuid,
    pub instrument_id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub description: String,
    pub instruction: String,
    pub sort_id: i64,
}

impl Question {
    pub fn new(ids: &IdDeriver, instrument_id: Uuid, name: &str) -> Self {
        Self {
            id: ids.child(instrument_id, name),
            instrument_id,
            name: normalize_name(name),
            ..Default::default()
        }
    }
}

impl Entity for Question {
    fn table() -> &'static Table {
        &tables::QUESTIONS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("question", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionItem {
    pub id: Uuid,
    pub question_id: Uuid,
    pub name: String,
    pub label: String,
    pub label_de: String,
    pub scale: String,
    pub sort_id: i64,
}

impl QuestionItem {
    pub fn new(ids: &IdDeriver, question_id: Uuid, name: &str) -> Self {
        Self {
            id: ids.child(question_id, name),
            question_id,
            name: normalize_name(name),
            ..Default::default()
        }
    }
}

impl Entity for QuestionItem {
    fn table() -> &'static Table {
        &tables::QUESTION_ITEMS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("question_item", &self.name)
    }
}

/// Content-addressed answer option, shared between question items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Answer {
    pub id: Uuid,
    pub value: String,
    pub label: String,
    pub label_de: String,
}

impl Answer {
    pub fn new(ids: &IdDeriver, value: &str, label: &str, label_de: &str) -> Self {
        Self {
            id: ids.answer(value, label, label_de),
            value: value.to_string(),
            label: label.to_string(),
            label_de: label_de.to_string(),
        }
    }
}

impl Entity for Answer {
    fn table() -> &'static Table {
        &tables::ANSWERS
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionItemAnswer {
    pub id: Uuid,
    pub question_item_id: Uuid,
    pub answer_id: Uuid,
    pub sort_id: i64,
}

impl QuestionItemAnswer {
    pub fn new(ids: &IdDeriver, question_item_id: Uuid, answer_id: Uuid, sort_id: i64) -> Self {
        Self {
            id: ids.relation("item_answer", question_item_id, answer_id),
            question_item_id,
            answer_id,
            sort_id,
        }
    }
}

impl Entity for QuestionItemAnswer {
    fn table() -> &'static Table {
        &tables::QUESTION_ITEM_ANSWERS
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionVariable {
    pub id: Uuid,
    pub question_id: Uuid,
    pub variable_id: Uuid,
}

impl QuestionVariable {
    pub fn new(ids: &IdDeriver, question_id: Uuid, variable_id: Uuid) -> Self {
        Self {
            id: ids.relation("question_variable", question_id, variable_id),
            question_id,
            variable_id,
        }
    }
}

impl Entity for QuestionVariable {
    fn table() -> &'static Table {
        &tables::QUESTIONS_VARIABLES
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptQuestion {
    pub id: Uuid,
    pub concept_id: Uuid,
    pub question_id: Uuid,
}

impl ConceptQuestion {
    pub fn new(ids: &IdDeriver, concept_id: Uuid, question_id: Uuid) -> Self {
        Self {
            id: ids.relation("concept_question", concept_id, question_id),
            concept_id,
            question_id,
        }
    }
}

impl Entity for ConceptQuestion {
    fn table() -> &'static Table {
        &tables::CONCEPTS_QUESTIONS
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

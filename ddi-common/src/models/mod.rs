//! Catalog entities
//!
//! Each entity is a plain serde struct whose field names equal its table's
//! column names. [`Entity`] ties the struct to its [`Table`] definition.

mod data;
mod import_run;
mod instruments;
mod publications;
mod study;
mod vocabulary;
mod workspace;

pub use data::{Dataset, Transformation, Variable};
pub use import_run::{ImportRun, JobRecord, JobState, RunState};
pub use instruments::{
    Answer, ConceptQuestion, Instrument, Question, QuestionItem, QuestionItemAnswer, QuestionVariable,
};
pub use publications::{Attachment, Publication, ATTACHMENT_TARGETS};
pub use study::{Study, System, SYSTEM_ID};
pub use vocabulary::{AnalysisUnit, Concept, ConceptTopic, ConceptualDataset, Period, Topic};
pub use workspace::{Basket, BasketVariable, Script, User};

use crate::db::schema::Table;
use crate::db::store::Record;
use crate::ids::normalize_name;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Sentinel name for "no value" references (`none` period, analysis unit ...)
pub const NONE_NAME: &str = "none";

/// A stored entity type
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table definition backing this entity
    fn table() -> &'static Table;

    fn id(&self) -> Uuid;

    /// Model-level validation, run before every write
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn to_record(&self) -> Result<Record> {
        match serde_json::to_value(self)? {
            Value::Object(record) => Ok(record),
            other => Err(Error::Internal(format!(
                "{} serialized to non-object {}",
                Self::table().name,
                other
            ))),
        }
    }

    fn from_record(record: Record) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }
}

/// Names must be non-empty and already normalized (trimmed, lower case)
pub fn validate_name(entity: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation(entity, "name must not be empty"));
    }
    if normalize_name(name) != name {
        return Err(Error::validation(
            entity,
            format!("name '{}' must be lower case without surrounding whitespace", name),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("concepts", "some-concept").is_ok());
        assert!(validate_name("concepts", "").is_err());
        assert!(validate_name("concepts", "Some-Concept").is_err());
        assert!(validate_name("concepts", " x").is_err());
    }
}

//! Publications and attachments

use super::{validate_name, Entity};
use crate::db::schema::Table;
use crate::db::tables;
use crate::ids::{normalize_name, IdDeriver};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Publication {
    pub id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    pub sub_type: String,
    pub title: String,
    pub author: String,
    pub year: Option<i64>,
    pub abstract_text: String,
    pub cite: String,
    pub url: String,
    pub doi: String,
    /// Free-text list of studies the publication uses
    pub studies: String,
}

impl Publication {
    pub fn new(ids: &IdDeriver, study_id: Uuid, name: &str) -> Self {
        Self {
            id: ids.child(study_id, name),
            study_id,
            name: normalize_name(name),
            ..Default::default()
        }
    }
}

impl Entity for Publication {
    fn table() -> &'static Table {
        &tables::PUBLICATIONS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        validate_name("publication", &self.name)
    }
}

/// Entity types an attachment may point at
pub const ATTACHMENT_TARGETS: &[&str] = &["study", "dataset", "variable", "instrument", "question"];

/// Link shown in a study context, pointing at any entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub id: Uuid,
    pub context_study_id: Uuid,
    pub target_type: String,
    pub target_id: Option<Uuid>,
    pub url: String,
    pub url_text: String,
}

impl Attachment {
    pub fn new(
        ids: &IdDeriver,
        context_study_id: Uuid,
        target_type: &str,
        target_id: Option<Uuid>,
        url: &str,
    ) -> Self {
        let target = target_id.map(|t| t.to_string()).unwrap_or_default();
        Self {
            id: ids.derive(
                context_study_id,
                &format!("attachment:{}:{}:{}", target_type, target, url),
            ),
            context_study_id,
            target_type: target_type.to_string(),
            target_id,
            url: url.to_string(),
            ..Default::default()
        }
    }
}

impl Entity for Attachment {
    fn table() -> &'static Table {
        &tables::ATTACHMENTS
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<()> {
        if !ATTACHMENT_TARGETS.contains(&self.target_type.as_str()) {
            return Err(Error::validation(
                "attachment",
                format!("unknown target type '{}'", self.target_type),
            ));
        }
        if self.url.is_empty() {
            return Err(Error::validation("attachment", "url must not be empty"));
        }
        Ok(())
    }
}

//! Study description (`study.json`)

use super::{ImportReport, Importer};
use crate::context::ImportContext;
use crate::tabular::{json_str, read_json_object};
use crate::ImportError;
use async_trait::async_trait;
use ddi_common::models::Study;
use serde_json::Value;
use std::path::Path;
use tracing::info;

pub struct StudyDescriptionImport;

#[async_trait]
impl Importer for StudyDescriptionImport {
    fn entity(&self) -> &'static str {
        "study"
    }

    async fn import(&self, ctx: &ImportContext, study: &Study, path: &Path) -> Result<ImportReport, ImportError> {
        let description = read_json_object(path)?;

        let mut updated = ctx.existing_or(study.id, || study.clone()).await?;
        if let Some(label) = json_str(&description, &["label", "title"]) {
            updated.label = label.to_string();
        }
        if let Some(label_de) = json_str(&description, &["label_de", "title_de"]) {
            updated.label_de = label_de.to_string();
        }
        if let Some(text) = json_str(&description, &["description", "abstract"]) {
            updated.description = text.to_string();
        }
        if let Some(doi) = json_str(&description, &["doi"]) {
            updated.doi = doi.to_string();
        }
        updated.config = Value::Object(description);

        ctx.upsert(&updated).await?;
        info!(study = %updated.name, "Imported study description");

        Ok(ImportReport {
            imported: 1,
            ..Default::default()
        })
    }
}

//! Publications and attachments (`publications.csv`, `attachments.csv`)

use super::RowImporter;
use crate::context::ImportContext;
use crate::tabular::Row;
use crate::ImportError;
use async_trait::async_trait;
use ddi_common::db::Store;
use ddi_common::models::{
    Attachment, Dataset, Entity, Instrument, Publication, Question, Study, Variable, ATTACHMENT_TARGETS,
};
use uuid::Uuid;

pub struct PublicationImport;

#[async_trait]
impl RowImporter for PublicationImport {
    fn entity(&self) -> &'static str {
        "publications"
    }

    fn name_column(&self) -> Option<&'static str> {
        Some("publication")
    }

    async fn import_row(&self, ctx: &ImportContext, study: &Study, row: &Row) -> Result<Option<Uuid>, ImportError> {
        let name = row.require("publications", "name")?;
        let id = ctx.ids.child(study.id, name);
        let mut publication = ctx
            .existing_or(id, || Publication::new(&ctx.ids, study.id, name))
            .await?;

        if let Some(v) = row.get("sub_type").or_else(|| row.get("type")) {
            publication.sub_type = v.to_string();
        }
        if let Some(v) = row.get("title") {
            publication.title = v.to_string();
        }
        if let Some(v) = row.get("author") {
            publication.author = v.to_string();
        }
        if let Some(year) = row.get_i64("publications", "year")? {
            publication.year = Some(year);
        }
        if let Some(v) = row.get("abstract") {
            publication.abstract_text = v.to_string();
        }
        if let Some(v) = row.get("cite") {
            publication.cite = v.to_string();
        }
        if let Some(v) = row.get("url") {
            publication.url = v.to_string();
        }
        if let Some(v) = row.get("doi") {
            publication.doi = v.to_string();
        }
        if let Some(v) = row.get("studies") {
            publication.studies = v.to_string();
        }

        ctx.upsert(&publication).await.map(Some)
    }
}

/// Links attached to a study or one of its datasets, variables,
/// instruments or questions
pub struct AttachmentImport;

impl AttachmentImport {
    async fn target(ctx: &ImportContext, study: &Study, target_type: &str, row: &Row) -> Result<Uuid, ImportError> {
        let entity = "attachments";
        let store: &dyn Store = ctx.store.as_ref();
        let (id, table) = match target_type {
            "study" => (study.id, Study::table()),
            "dataset" => (ctx.ids.child(study.id, row.require(entity, "dataset")?), Dataset::table()),
            "variable" => {
                let dataset = ctx.ids.child(study.id, row.require(entity, "dataset")?);
                (ctx.ids.child(dataset, row.require(entity, "variable")?), Variable::table())
            }
            "instrument" => (ctx.ids.child(study.id, row.require(entity, "instrument")?), Instrument::table()),
            "question" => {
                let instrument = ctx.ids.child(study.id, row.require(entity, "instrument")?);
                (ctx.ids.child(instrument, row.require(entity, "question")?), Question::table())
            }
            other => {
                return Err(ImportError::row(
                    entity,
                    format!("unknown target type '{}' (expected one of {})", other, ATTACHMENT_TARGETS.join(", ")),
                ))
            }
        };

        if store.fetch(table, id).await?.is_none() {
            return Err(ImportError::row(
                entity,
                format!("{} target of '{}' not found", target_type, row.get_or("url", "")),
            ));
        }
        Ok(id)
    }
}

#[async_trait]
impl RowImporter for AttachmentImport {
    fn entity(&self) -> &'static str {
        "attachments"
    }

    async fn import_row(&self, ctx: &ImportContext, study: &Study, row: &Row) -> Result<Option<Uuid>, ImportError> {
        let target_type = row
            .get("target_type")
            .or_else(|| row.get("type"))
            .ok_or_else(|| ImportError::missing_field("attachments", "type"))?
            .to_lowercase();
        let url = row.require("attachments", "url")?;
        let target_id = Self::target(ctx, study, &target_type, row).await?;

        let mut attachment = Attachment::new(&ctx.ids, study.id, &target_type, Some(target_id), url);
        if let Some(v) = row.get("url_text") {
            attachment.url_text = v.to_string();
        }

        ctx.repo::<Attachment>().upsert(&attachment).await?;
        Ok(Some(attachment.id))
    }
}

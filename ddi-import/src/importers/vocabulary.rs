//! Topics, concepts and the study vocabulary
//! (`topics.csv`, `concepts.csv`, `analysis_units.csv`, `periods.csv`,
//! `conceptual_datasets.csv`)

use super::{load_csv, ImportReport, Importer, RowImporter};
use crate::context::ImportContext;
use crate::tabular::Row;
use crate::ImportError;
use async_trait::async_trait;
use ddi_common::models::{AnalysisUnit, Concept, ConceptTopic, ConceptualDataset, Entity, Period, Study, Topic};
use indexmap::IndexMap;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Copy the label columns shared by most vocabulary files
fn set_labels(row: &Row, label: &mut String, label_de: &mut String, description: &mut String) {
    if let Some(v) = row.get("label") {
        *label = v.to_string();
    }
    if let Some(v) = row.get("label_de") {
        *label_de = v.to_string();
    }
    if let Some(v) = row.get("description") {
        *description = v.to_string();
    }
}

/// Topic tree of a study
///
/// Rows are read first, then parent links are resolved against the file
/// and the stored topics, and the whole tree is written in one batch.
pub struct TopicImport;

#[async_trait]
impl Importer for TopicImport {
    fn entity(&self) -> &'static str {
        "topics"
    }

    async fn import(&self, ctx: &ImportContext, study: &Study, path: &Path) -> Result<ImportReport, ImportError> {
        let dataset = load_csv(path, Some("topic"))?;
        let repo = ctx.repo::<Topic>();
        let mut report = ImportReport::default();
        let mut topics: IndexMap<Uuid, (Topic, Option<String>)> = IndexMap::new();

        for row in dataset.rows() {
            let built = async {
                let name = row.require("topics", "name")?;
                let id = ctx.ids.child(study.id, name);
                let mut topic = ctx.existing_or(id, || Topic::new(&ctx.ids, study.id, name)).await?;
                set_labels(row, &mut topic.label, &mut topic.label_de, &mut topic.description);
                if let Some(v) = row.get("description_de") {
                    topic.description_de = v.to_string();
                }
                topic.validate()?;
                Ok::<_, ImportError>(topic)
            }
            .await;

            match built {
                Ok(topic) => {
                    topics.insert(topic.id, (topic, row.get("parent").map(str::to_string)));
                }
                Err(e) => {
                    warn!(study = %study.name, entity = "topics", line = row.line(), record = %row.to_json(), error = %e, "Row import failed");
                    report.failed += 1;
                }
            }
        }

        // Parent links: the file first, then stored topics
        let mut resolved = Vec::with_capacity(topics.len());
        for (topic, parent) in topics.values() {
            let mut topic = topic.clone();
            topic.parent_id = None;
            if let Some(parent) = parent {
                let parent_id = ctx.ids.child(study.id, parent);
                if parent_id == topic.id {
                    warn!(study = %study.name, topic = %topic.name, "Topic lists itself as parent; stored as root");
                } else if topics.contains_key(&parent_id) || repo.exists(parent_id).await? {
                    topic.parent_id = Some(parent_id);
                } else {
                    warn!(study = %study.name, topic = %topic.name, parent = %parent, "Parent topic not found; stored as root");
                }
            }
            resolved.push(topic);
        }

        report.imported = repo.upsert_many(&resolved).await?;
        for topic in &resolved {
            ctx.changed(topic);
        }

        info!(study = %study.name, entity = "topics", imported = report.imported, failed = report.failed, "Import finished");
        Ok(report)
    }
}

/// Concepts, optionally filed under a topic of the study
pub struct ConceptImport;

#[async_trait]
impl RowImporter for ConceptImport {
    fn entity(&self) -> &'static str {
        "concepts"
    }

    fn name_column(&self) -> Option<&'static str> {
        Some("concept")
    }

    async fn import_row(&self, ctx: &ImportContext, study: &Study, row: &Row) -> Result<Option<Uuid>, ImportError> {
        let name = row.require("concepts", "name")?;
        let id = ctx.ids.concept(name);
        let mut concept = ctx.existing_or(id, || Concept::new(&ctx.ids, name)).await?;
        set_labels(row, &mut concept.label, &mut concept.label_de, &mut concept.description);
        if let Some(v) = row.get("description_de") {
            concept.description_de = v.to_string();
        }
        ctx.repo::<Concept>().upsert(&concept).await?;

        if let Some(topic) = row.get("topic") {
            let topic_id = ctx.ids.child(study.id, topic);
            if ctx.repo::<Topic>().exists(topic_id).await? {
                ctx.upsert(&ConceptTopic::new(&ctx.ids, concept.id, topic_id)).await?;
            } else {
                warn!(study = %study.name, concept = %concept.name, topic, "Topic not found; concept left unfiled");
            }
        }
        // announced once its topic link is in place
        ctx.changed(&concept);

        Ok(Some(id))
    }
}

pub struct AnalysisUnitImport;

#[async_trait]
impl RowImporter for AnalysisUnitImport {
    fn entity(&self) -> &'static str {
        "analysis_units"
    }

    fn name_column(&self) -> Option<&'static str> {
        Some("analysis_unit")
    }

    async fn import_row(&self, ctx: &ImportContext, study: &Study, row: &Row) -> Result<Option<Uuid>, ImportError> {
        let name = row.require("analysis_units", "name")?;
        let id = ctx.ids.child(study.id, name);
        let mut unit = ctx
            .existing_or(id, || AnalysisUnit::new(&ctx.ids, study.id, name))
            .await?;
        set_labels(row, &mut unit.label, &mut unit.label_de, &mut unit.description);
        ctx.upsert(&unit).await.map(Some)
    }
}

pub struct PeriodImport;

#[async_trait]
impl RowImporter for PeriodImport {
    fn entity(&self) -> &'static str {
        "periods"
    }

    fn name_column(&self) -> Option<&'static str> {
        Some("period")
    }

    async fn import_row(&self, ctx: &ImportContext, study: &Study, row: &Row) -> Result<Option<Uuid>, ImportError> {
        let name = row.require("periods", "name")?;
        let id = ctx.ids.child(study.id, name);
        let mut period = ctx.existing_or(id, || Period::new(&ctx.ids, study.id, name)).await?;
        set_labels(row, &mut period.label, &mut period.label_de, &mut period.description);
        if let Some(v) = row.get("definition") {
            period.definition = v.to_string();
        }
        ctx.upsert(&period).await.map(Some)
    }
}

/// Conceptual datasets are shared across studies
pub struct ConceptualDatasetImport;

#[async_trait]
impl RowImporter for ConceptualDatasetImport {
    fn entity(&self) -> &'static str {
        "conceptual_datasets"
    }

    fn name_column(&self) -> Option<&'static str> {
        Some("conceptual_dataset")
    }

    async fn import_row(&self, ctx: &ImportContext, _study: &Study, row: &Row) -> Result<Option<Uuid>, ImportError> {
        let name = row.require("conceptual_datasets", "name")?;
        let id = ctx.ids.conceptual_dataset(name);
        let mut dataset = ctx
            .existing_or(id, || ConceptualDataset::new(&ctx.ids, name))
            .await?;
        set_labels(row, &mut dataset.label, &mut dataset.label_de, &mut dataset.description);
        ctx.upsert(&dataset).await.map(Some)
    }
}

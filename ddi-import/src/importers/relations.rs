//! Relation files (`questions_variables.csv`, `concepts_questions.csv`,
//! `transformations.csv`)
//!
//! Both endpoints of every row must exist. The first row that does not
//! resolve aborts the file with an error naming both endpoints.

use super::{load_csv, ImportReport, Importer, RowImporter};
use crate::context::ImportContext;
use crate::tabular::Row;
use crate::ImportError;
use async_trait::async_trait;
use ddi_common::db::repository::to_records;
use ddi_common::models::{Concept, ConceptQuestion, Entity, Question, QuestionVariable, Study, Transformation, Variable};
use indexmap::IndexSet;
use std::path::Path;
use tracing::{error, info};
use uuid::Uuid;

/// A resolved endpoint: its id and a readable path for messages
struct Endpoint {
    id: Uuid,
    label: String,
}

async fn variable(
    ctx: &ImportContext,
    entity: &str,
    row: &Row,
    study: &str,
    prefix: &str,
) -> Result<(Endpoint, bool), ImportError> {
    let column = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", prefix, name)
        }
    };
    let study = row.get(&column("study")).unwrap_or(study);
    let dataset = row.require(entity, &column("dataset"))?;
    let name = row.require(entity, &column("variable"))?;

    let dataset_id = ctx.ids.child(ctx.ids.study(study), dataset);
    let id = ctx.ids.child(dataset_id, name);
    let exists = ctx.repo::<Variable>().exists(id).await?;
    Ok((
        Endpoint {
            id,
            label: format!("variable {}/{}/{}", study, dataset, name),
        },
        exists,
    ))
}

async fn question(ctx: &ImportContext, entity: &str, row: &Row, study: &Study) -> Result<(Endpoint, bool), ImportError> {
    let instrument = row.require(entity, "instrument")?;
    let name = row.require(entity, "question")?;

    let instrument_id = ctx.ids.child(study.id, instrument);
    let id = ctx.ids.child(instrument_id, name);
    let exists = ctx.repo::<Question>().exists(id).await?;
    Ok((
        Endpoint {
            id,
            label: format!("question {}/{}/{}", study.name, instrument, name),
        },
        exists,
    ))
}

fn ensure(entity: &str, origin: (Endpoint, bool), target: (Endpoint, bool)) -> Result<(Uuid, Uuid), ImportError> {
    let ((origin, origin_found), (target, target_found)) = (origin, target);
    if origin_found && target_found {
        Ok((origin.id, target.id))
    } else {
        Err(ImportError::unresolved(entity, origin.label, target.label))
    }
}

pub struct QuestionVariableImport;

#[async_trait]
impl RowImporter for QuestionVariableImport {
    fn entity(&self) -> &'static str {
        "questions_variables"
    }

    fn strict(&self) -> bool {
        true
    }

    async fn import_row(&self, ctx: &ImportContext, study: &Study, row: &Row) -> Result<Option<Uuid>, ImportError> {
        let entity = self.entity();
        let origin = question(ctx, entity, row, study).await?;
        let target = variable(ctx, entity, row, &study.name, "").await?;
        let (question_id, variable_id) = ensure(entity, origin, target)?;

        ctx.repo::<QuestionVariable>()
            .upsert(&QuestionVariable::new(&ctx.ids, question_id, variable_id))
            .await?;
        Ok(Some(question_id))
    }
}

pub struct ConceptQuestionImport;

#[async_trait]
impl RowImporter for ConceptQuestionImport {
    fn entity(&self) -> &'static str {
        "concepts_questions"
    }

    fn strict(&self) -> bool {
        true
    }

    async fn import_row(&self, ctx: &ImportContext, study: &Study, row: &Row) -> Result<Option<Uuid>, ImportError> {
        let entity = self.entity();
        let concept = row.require(entity, "concept")?;
        let concept_id = ctx.ids.concept(concept);
        let origin = (
            Endpoint {
                id: concept_id,
                label: format!("concept {}", concept),
            },
            ctx.repo::<Concept>().exists(concept_id).await?,
        );
        let target = question(ctx, entity, row, study).await?;
        let (concept_id, question_id) = ensure(entity, origin, target)?;

        ctx.repo::<ConceptQuestion>()
            .upsert(&ConceptQuestion::new(&ctx.ids, concept_id, question_id))
            .await?;
        // concept documents list their questions' study
        ctx.changed(&Concept::new(&ctx.ids, concept));
        Ok(Some(concept_id))
    }
}

/// Variable lineage
///
/// Every row is resolved before anything is written. Edges that already
/// exist are skipped, the rest are inserted in one transaction.
pub struct TransformationImport;

#[async_trait]
impl Importer for TransformationImport {
    fn entity(&self) -> &'static str {
        "transformations"
    }

    async fn import(&self, ctx: &ImportContext, study: &Study, path: &Path) -> Result<ImportReport, ImportError> {
        let entity = self.entity();
        let dataset = load_csv(path, None)?;

        let mut edges: IndexSet<(Uuid, Uuid)> = IndexSet::new();
        for row in dataset.rows() {
            let origin = variable(ctx, entity, row, &study.name, "origin").await?;
            let target = variable(ctx, entity, row, &study.name, "target").await?;
            match ensure(entity, origin, target) {
                Ok(edge) => {
                    edges.insert(edge);
                }
                Err(e) => {
                    error!(
                        study = %study.name,
                        entity,
                        line = row.line(),
                        record = %row.to_json(),
                        error = %e,
                        "Relation import aborted"
                    );
                    return Err(e);
                }
            }
        }

        let transformations: Vec<Transformation> = edges
            .iter()
            .map(|(origin, target)| Transformation::new(&ctx.ids, *origin, *target))
            .collect();
        let inserted = ctx
            .store
            .insert_missing(Transformation::table(), &["origin_id", "target_id"], to_records(&transformations)?)
            .await?;

        let report = ImportReport {
            imported: inserted,
            skipped: dataset.len() - inserted,
            failed: 0,
        };
        info!(
            study = %study.name,
            entity,
            imported = report.imported,
            skipped = report.skipped,
            "Import finished"
        );
        Ok(report)
    }
}

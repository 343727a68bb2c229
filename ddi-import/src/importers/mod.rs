//! Per-entity importers
//!
//! CSV importers implement [`RowImporter`] and run through [`Csv`], which
//! processes rows in file order and keeps going after a failed row. Relation
//! importers are strict: the first unresolvable row aborts the file. JSON
//! importers build their whole file in memory and write it as one batch.

mod datasets;
mod instruments;
mod publications;
mod relations;
mod study;
mod vocabulary;

pub use datasets::{DatasetImport, DatasetJsonImport, VariableImport};
pub use instruments::{AnswerDeduplicator, InstrumentImport};
pub use publications::{AttachmentImport, PublicationImport};
pub use relations::{ConceptQuestionImport, QuestionVariableImport, TransformationImport};
pub use study::StudyDescriptionImport;
pub use vocabulary::{AnalysisUnitImport, ConceptImport, ConceptualDatasetImport, PeriodImport, TopicImport};

use crate::context::ImportContext;
use crate::tabular::{Row, TabularDataset};
use crate::ImportError;
use async_trait::async_trait;
use ddi_common::models::Study;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome counts of one import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ImportReport {
    pub fn merge(&mut self, other: ImportReport) {
        self.imported += other.imported;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.imported + self.skipped + self.failed
    }
}

/// Imports one source file for a study
#[async_trait]
pub trait Importer: Send + Sync {
    /// Entity key used in logs and run records
    fn entity(&self) -> &'static str;

    async fn import(&self, ctx: &ImportContext, study: &Study, path: &Path) -> Result<ImportReport, ImportError>;
}

/// Maps one CSV row to an entity
#[async_trait]
pub trait RowImporter: Send + Sync {
    fn entity(&self) -> &'static str;

    /// Column naming the entity itself, renamed to `name` when `name` is absent
    fn name_column(&self) -> Option<&'static str> {
        None
    }

    /// Abort the file on the first failing row
    fn strict(&self) -> bool {
        false
    }

    /// Import one row; `Ok(None)` marks it skipped
    async fn import_row(&self, ctx: &ImportContext, study: &Study, row: &Row) -> Result<Option<Uuid>, ImportError>;
}

/// Adapter running a [`RowImporter`] over a CSV file
pub struct Csv<I>(pub I);

#[async_trait]
impl<I: RowImporter> Importer for Csv<I> {
    fn entity(&self) -> &'static str {
        self.0.entity()
    }

    async fn import(&self, ctx: &ImportContext, study: &Study, path: &Path) -> Result<ImportReport, ImportError> {
        let dataset = load_csv(path, self.0.name_column())?;
        import_rows(&self.0, ctx, study, dataset.rows()).await
    }
}

/// Read a CSV source with legacy renames applied
pub fn load_csv(path: &Path, name_column: Option<&str>) -> Result<TabularDataset, ImportError> {
    let mut dataset = TabularDataset::from_path(path)?;
    dataset.apply_legacy_renames();
    if let Some(column) = name_column {
        dataset.rename(column, "name");
    }
    Ok(dataset)
}

/// Run `importer` over `rows` in order
pub async fn import_rows<I: RowImporter + ?Sized>(
    importer: &I,
    ctx: &ImportContext,
    study: &Study,
    rows: &[Row],
) -> Result<ImportReport, ImportError> {
    let entity = importer.entity();
    let mut report = ImportReport::default();

    for row in rows {
        match importer.import_row(ctx, study, row).await {
            Ok(Some(_)) => report.imported += 1,
            Ok(None) => report.skipped += 1,
            Err(e) if importer.strict() => {
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
            Err(e) => {
                warn!(
                    study = %study.name,
                    entity,
                    line = row.line(),
                    record = %row.to_json(),
                    error = %e,
                    "Row import failed"
                );
                report.failed += 1;
            }
        }
    }

    info!(
        study = %study.name,
        entity,
        imported = report.imported,
        skipped = report.skipped,
        failed = report.failed,
        "Import finished"
    );
    Ok(report)
}

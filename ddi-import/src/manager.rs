//! Import orchestration for one study
//!
//! Each entity key maps to an importer, its source file (or glob) below the
//! study's import folder, and the keys it depends on. A full import submits
//! every key at once; the queue holds each job back until all jobs of its
//! predecessor keys have completed.

use crate::context::ImportContext;
use crate::importers::{
    AnalysisUnitImport, AttachmentImport, ConceptImport, ConceptQuestionImport, ConceptualDatasetImport, Csv,
    DatasetImport, DatasetJsonImport, ImportReport, Importer, InstrumentImport, PeriodImport, PublicationImport,
    QuestionVariableImport, StudyDescriptionImport, TopicImport, TransformationImport, VariableImport,
};
use crate::queue::{JobHandle, JobQueue};
use crate::runs::save_run;
use crate::ImportError;
use chrono::Utc;
use ddi_common::events::DdiEvent;
use ddi_common::models::{ImportRun, JobState, Study};
use futures::FutureExt;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Where an entity's source lives, relative to the import folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    File(&'static str),
    Glob(&'static str),
}

pub struct ImportSpec {
    pub key: &'static str,
    pub importer: Arc<dyn Importer>,
    pub source: Source,
    /// Keys whose jobs must complete first
    pub after: &'static [&'static str],
}

impl ImportSpec {
    fn new(key: &'static str, importer: impl Importer + 'static, source: Source, after: &'static [&'static str]) -> Self {
        Self {
            key,
            importer: Arc::new(importer),
            source,
            after,
        }
    }
}

/// All entity keys in import order
pub fn default_specs() -> IndexMap<&'static str, ImportSpec> {
    use Source::{File, Glob};

    [
        ImportSpec::new("study", StudyDescriptionImport, File("study.json"), &[]),
        ImportSpec::new("topics", TopicImport, File("topics.csv"), &["study"]),
        ImportSpec::new("concepts", Csv(ConceptImport), File("concepts.csv"), &["topics"]),
        ImportSpec::new("analysis_units", Csv(AnalysisUnitImport), File("analysis_units.csv"), &["study"]),
        ImportSpec::new("periods", Csv(PeriodImport), File("periods.csv"), &["study"]),
        ImportSpec::new(
            "conceptual_datasets",
            Csv(ConceptualDatasetImport),
            File("conceptual_datasets.csv"),
            &["study"],
        ),
        ImportSpec::new(
            "instruments",
            InstrumentImport,
            Glob("instruments/*.json"),
            &["analysis_units", "periods"],
        ),
        ImportSpec::new(
            "datasets.json",
            DatasetJsonImport,
            File("datasets.json"),
            &["analysis_units", "periods", "conceptual_datasets"],
        ),
        ImportSpec::new(
            "datasets",
            Csv(DatasetImport),
            File("datasets.csv"),
            &["datasets.json", "analysis_units", "periods", "conceptual_datasets"],
        ),
        ImportSpec::new("variables", Csv(VariableImport), File("variables.csv"), &["datasets", "concepts"]),
        ImportSpec::new(
            "questions_variables",
            Csv(QuestionVariableImport),
            File("questions_variables.csv"),
            &["instruments", "variables"],
        ),
        ImportSpec::new(
            "concepts_questions",
            Csv(ConceptQuestionImport),
            File("concepts_questions.csv"),
            &["concepts", "instruments"],
        ),
        ImportSpec::new(
            "transformations",
            TransformationImport,
            File("transformations.csv"),
            &["variables"],
        ),
        ImportSpec::new(
            "attachments",
            Csv(AttachmentImport),
            File("attachments.csv"),
            &["instruments", "variables"],
        ),
        ImportSpec::new("publications", Csv(PublicationImport), File("publications.csv"), &["study"]),
    ]
    .into_iter()
    .map(|spec| (spec.key, spec))
    .collect()
}

pub struct StudyImportManager {
    ctx: ImportContext,
    queue: JobQueue,
    study: Study,
    import_path: PathBuf,
    specs: IndexMap<&'static str, ImportSpec>,
}

impl StudyImportManager {
    pub fn new(ctx: ImportContext, queue: JobQueue, study: Study, import_path: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            queue,
            study,
            import_path: import_path.into(),
            specs: default_specs(),
        }
    }

    /// Replace the entity table (tests use reduced or failing importers)
    pub fn with_specs(mut self, specs: IndexMap<&'static str, ImportSpec>) -> Self {
        self.specs = specs;
        self
    }

    pub fn study(&self) -> &Study {
        &self.study
    }

    pub fn import_path(&self) -> &Path {
        &self.import_path
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.keys().copied()
    }

    fn spec(&self, key: &str) -> Result<&ImportSpec, ImportError> {
        self.specs
            .get(key)
            .ok_or_else(|| ImportError::UnknownEntity(key.to_string()))
    }

    /// Existing source files of `key`, sorted for globs
    pub fn resolve_files(&self, key: &str) -> Result<Vec<PathBuf>, ImportError> {
        match self.spec(key)?.source {
            Source::File(name) => {
                let path = self.import_path.join(name);
                Ok(if path.is_file() { vec![path] } else { Vec::new() })
            }
            Source::Glob(pattern) => {
                let pattern = self.import_path.join(pattern);
                let pattern = pattern.to_string_lossy();
                let mut files: Vec<PathBuf> = glob::glob(&pattern)
                    .map_err(|e| ImportError::Pattern(format!("{}: {}", pattern, e)))?
                    .filter_map(|entry| match entry {
                        Ok(path) if path.is_file() => Some(path),
                        Ok(_) => None,
                        Err(e) => {
                            warn!(error = %e, "Unreadable import source");
                            None
                        }
                    })
                    .collect();
                files.sort();
                Ok(files)
            }
        }
    }

    /// One job per file, each waiting for `predecessors`
    ///
    /// A key without source files still gets one (empty) job so that
    /// barriers on it behave the same way.
    fn dispatch(&self, spec: &ImportSpec, files: &[PathBuf], predecessors: &[JobHandle]) -> Vec<JobHandle> {
        if files.is_empty() {
            info!(study = %self.study.name, entity = spec.key, "No import source; nothing to import");
            let job = async { Ok(ImportReport::default()) }.boxed();
            return vec![self.queue.submit(spec.key, predecessors.to_vec(), job)];
        }

        files
            .iter()
            .map(|path| {
                let name = format!("{}:{}", spec.key, self.relative(path).display());
                let importer = Arc::clone(&spec.importer);
                let ctx = self.ctx.clone();
                let study = self.study.clone();
                let path = path.clone();
                let key = spec.key;

                let job = async move {
                    match importer.import(&ctx, &study, &path).await {
                        Err(ImportError::MissingSource(missing)) => {
                            warn!(study = %study.name, entity = key, path = %missing.display(), "Import source vanished");
                            Ok(ImportReport::default())
                        }
                        other => other,
                    }
                }
                .boxed();

                self.queue.submit(name, predecessors.to_vec(), job)
            })
            .collect()
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.import_path).unwrap_or(path)
    }

    /// Import one entity type now, without waiting for other types
    ///
    /// `explicit_file` replaces the configured source (relative paths are
    /// taken from the import folder). Returns immediately; callers may drop
    /// the handles.
    pub fn import_single_entity(&self, key: &str, explicit_file: Option<&Path>) -> Result<Vec<JobHandle>, ImportError> {
        let spec = self.spec(key)?;
        let files = match explicit_file {
            Some(file) if file.is_absolute() => vec![file.to_path_buf()],
            Some(file) => vec![self.import_path.join(file)],
            None => self.resolve_files(key)?,
        };

        info!(study = %self.study.name, entity = key, files = files.len(), "Dispatching import");
        Ok(self.dispatch(spec, &files, &[]))
    }

    /// Import every entity type in dependency order and record the run
    pub async fn import_all_entities(&self, commit: Option<String>) -> Result<ImportRun, ImportError> {
        let mut run = ImportRun::new(Some(self.study.id), &self.study.name, commit);
        let mut handles: IndexMap<&'static str, Vec<JobHandle>> = IndexMap::new();

        for spec in self.specs.values() {
            let files = self.resolve_files(spec.key)?;
            let predecessors: Vec<JobHandle> = spec
                .after
                .iter()
                .filter_map(|key| handles.get(key))
                .flatten()
                .cloned()
                .collect();

            let job = run.job_mut(spec.key);
            job.files = files.iter().map(|f| self.relative(f).display().to_string()).collect();
            handles.insert(spec.key, self.dispatch(spec, &files, &predecessors));
        }

        save_run(&self.ctx.store, &run).await?;
        info!(study = %self.study.name, run_id = %run.id, jobs = handles.len(), "Import run started");
        self.ctx.events.emit_lossy(DdiEvent::ImportRunStarted {
            run_id: run.id,
            study: self.study.name.clone(),
            timestamp: Utc::now(),
        });

        for (key, key_handles) in &handles {
            let mut report = ImportReport::default();
            let mut state = JobState::Completed;
            let mut error = None;

            for handle in key_handles {
                let outcome = handle.wait().await;
                report.merge(outcome.report());
                match outcome.state() {
                    JobState::Failed => state = JobState::Failed,
                    JobState::Skipped if state == JobState::Completed => state = JobState::Skipped,
                    _ => {}
                }
                if error.is_none() {
                    error = outcome.error().map(str::to_string);
                }
            }

            let job = run.job_mut(key);
            job.state = state;
            job.imported = report.imported;
            job.skipped = report.skipped;
            job.failed = report.failed;
            job.error = error;

            self.ctx.events.emit_lossy(DdiEvent::ImportJobFinished {
                run_id: run.id,
                study: self.study.name.clone(),
                entity: key.to_string(),
                state: state.as_str().to_string(),
                imported: report.imported,
                failed: report.failed,
            });
        }

        let state = run.finish();
        save_run(&self.ctx.store, &run).await?;

        info!(study = %self.study.name, run_id = %run.id, state = state.as_str(), "Import run finished");
        self.ctx.events.emit_lossy(DdiEvent::ImportRunFinished {
            run_id: run.id,
            study: self.study.name.clone(),
            state: state.as_str().to_string(),
            timestamp: Utc::now(),
        });

        Ok(run)
    }
}

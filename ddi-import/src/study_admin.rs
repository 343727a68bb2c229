//! Study lifecycle: register, sync, import, remove
//!
//! Shared by the `ddi` command line and the portal's push webhook.

use crate::context::ImportContext;
use crate::git::GitRepository;
use crate::importers::{load_csv, ImportReport};
use crate::manager::StudyImportManager;
use crate::queue::{JobOutcome, JobQueue};
use crate::ImportError;
use ddi_common::config::DdiConfig;
use ddi_common::db::cascade::{delete_study, CascadeReport};
use ddi_common::db::Filter;
use ddi_common::events::DdiEvent;
use ddi_common::models::{ImportRun, Study, System, SYSTEM_ID};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// File in the system repository listing all studies
pub const STUDIES_FILE: &str = "studies.csv";

/// Commit of a checkout before and after a sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUpdate {
    pub previous: Option<String>,
    pub current: Option<String>,
}

impl RepoUpdate {
    pub fn moved(&self) -> bool {
        self.current.is_some() && self.current != self.previous
    }
}

/// Result of `update`: a full run or the outcomes of selected entity keys
#[derive(Debug)]
pub enum StudyImport {
    Run(ImportRun),
    Entities(IndexMap<String, Vec<JobOutcome>>),
}

#[derive(Clone)]
pub struct StudyAdmin {
    ctx: ImportContext,
    config: Arc<DdiConfig>,
    queue: JobQueue,
}

impl StudyAdmin {
    pub fn new(ctx: ImportContext, config: Arc<DdiConfig>, queue: JobQueue) -> Self {
        Self { ctx, config, queue }
    }

    pub fn context(&self) -> &ImportContext {
        &self.ctx
    }

    pub fn config(&self) -> &DdiConfig {
        &self.config
    }

    /// Register a study, or update the repository URL of an existing one
    pub async fn add_study(&self, name: &str, repo: &str) -> Result<Study, ImportError> {
        let id = self.ctx.ids.study(name);
        let mut study = self.ctx.existing_or(id, || Study::new(&self.ctx.ids, name)).await?;
        if !repo.is_empty() {
            study.repo = repo.to_string();
        }
        self.ctx.upsert(&study).await?;
        info!(study = %study.name, repo = %study.repo, "Study registered");
        Ok(study)
    }

    pub async fn find_study(&self, name: &str) -> Result<Option<Study>, ImportError> {
        Ok(self.ctx.repo::<Study>().get(self.ctx.ids.study(name)).await?)
    }

    pub async fn require_study(&self, name: &str) -> Result<Study, ImportError> {
        self.find_study(name)
            .await?
            .ok_or_else(|| ddi_common::Error::NotFound(format!("study '{}'", name)).into())
    }

    pub async fn all_studies(&self) -> Result<Vec<Study>, ImportError> {
        Ok(self.ctx.repo::<Study>().filter(&Filter::new().order_by("name")).await?)
    }

    /// Delete a study with all dependent rows; `None` if it does not exist
    pub async fn remove_study(&self, name: &str) -> Result<Option<CascadeReport>, ImportError> {
        let Some(study) = self.find_study(name).await? else {
            return Ok(None);
        };

        let report = delete_study(self.ctx.store.as_ref(), study.id).await?;
        for (table, ids) in &report.deleted {
            for id in ids {
                self.ctx.events.emit_lossy(DdiEvent::deleted(table, *id));
            }
        }
        info!(study = %study.name, rows = report.total(), "Study removed");
        Ok(Some(report))
    }

    /// Import folder inside a study's checkout
    pub fn import_path(&self, study: &Study) -> PathBuf {
        self.config
            .study_repo_path(&study.name)
            .join(&self.config.import_subdir)
    }

    pub fn manager(&self, study: &Study) -> StudyImportManager {
        StudyImportManager::new(self.ctx.clone(), self.queue.clone(), study.clone(), self.import_path(study))
    }

    /// Pull (or clone) the study repository and record its commit
    ///
    /// With `local`, the checkout is used as it is.
    pub async fn update_study_repo(&self, study: &Study, local: bool) -> Result<RepoUpdate, ImportError> {
        let checkout = GitRepository::new(self.config.study_repo_path(&study.name), study.repo.clone());
        let current = sync_checkout(&checkout, local).await?;

        let update = RepoUpdate {
            previous: study.current_commit.clone(),
            current,
        };
        if update.moved() {
            let mut stored = self.require_study(&study.name).await?;
            stored.current_commit = update.current.clone();
            self.ctx.repo::<Study>().upsert(&stored).await?;
            info!(study = %study.name, commit = ?update.current, "Study repository updated");
            if let Some(commit) = &update.current {
                self.ctx.events.emit_lossy(DdiEvent::RepositoryUpdated {
                    study: Some(study.name.clone()),
                    commit: commit.clone(),
                });
            }
        }
        Ok(update)
    }

    /// Import all entity types, or only `entities` (optionally from `filename`)
    pub async fn import_study(
        &self,
        study: &Study,
        entities: &[String],
        filename: Option<&Path>,
    ) -> Result<StudyImport, ImportError> {
        let manager = self.manager(study);
        if entities.is_empty() {
            let commit = self.find_study(&study.name).await?.and_then(|s| s.current_commit);
            return manager.import_all_entities(commit).await.map(StudyImport::Run);
        }

        let mut outcomes = IndexMap::new();
        for key in entities {
            let handles = manager.import_single_entity(key, filename)?;
            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(handle.wait().await);
            }
            outcomes.insert(key.clone(), results);
        }
        Ok(StudyImport::Entities(outcomes))
    }

    /// Sync the repository of `name`, then import it
    pub async fn update(
        &self,
        name: &str,
        entities: &[String],
        filename: Option<&Path>,
        local: bool,
    ) -> Result<StudyImport, ImportError> {
        let study = self.require_study(name).await?;
        self.update_study_repo(&study, local).await?;
        self.import_study(&study, entities, filename).await
    }

    /// Pull every study and re-import those whose commit moved
    pub async fn upgrade(&self) -> Result<Vec<ImportRun>, ImportError> {
        let mut runs = Vec::new();
        for study in self.all_studies().await? {
            let update = match self.update_study_repo(&study, false).await {
                Ok(update) => update,
                Err(e) => {
                    warn!(study = %study.name, error = %e, "Repository sync failed; study left as is");
                    continue;
                }
            };
            if !update.moved() {
                info!(study = %study.name, "Study up to date");
                continue;
            }
            if let StudyImport::Run(run) = self.import_study(&study, &[], None).await? {
                runs.push(run);
            }
        }
        Ok(runs)
    }

    /// Pull the system repository and record its commit
    pub async fn update_system_repo(&self, local: bool) -> Result<RepoUpdate, ImportError> {
        let url = self.config.system_repo.clone().unwrap_or_default();
        let checkout = GitRepository::new(self.config.system_repo_path(), url.clone());
        let current = sync_checkout(&checkout, local).await?;

        let (mut system, _) = self
            .ctx
            .repo::<System>()
            .get_or_create(SYSTEM_ID, System::default)
            .await?;
        let update = RepoUpdate {
            previous: system.current_commit.clone(),
            current,
        };
        if update.moved() || system.repo != url {
            system.repo = url;
            if update.current.is_some() {
                system.current_commit = update.current.clone();
            }
            self.ctx.repo::<System>().upsert(&system).await?;
        }
        if let (true, Some(commit)) = (update.moved(), &update.current) {
            info!(commit = %commit, "System repository updated");
            self.ctx.events.emit_lossy(DdiEvent::RepositoryUpdated {
                study: None,
                commit: commit.clone(),
            });
        }
        Ok(update)
    }

    /// Register every study listed in `studies.csv` (`name`, `repo`)
    pub async fn import_system_studies(&self, path: &Path) -> Result<ImportReport, ImportError> {
        let dataset = load_csv(path, Some("study"))?;
        let mut report = ImportReport::default();

        for row in dataset.rows() {
            let added = async {
                let name = row.require("studies", "name")?;
                self.add_study(name, row.get_or("repo", "")).await
            }
            .await;
            match added {
                Ok(_) => report.imported += 1,
                Err(e) => {
                    warn!(entity = "studies", line = row.line(), record = %row.to_json(), error = %e, "Row import failed");
                    report.failed += 1;
                }
            }
        }

        info!(imported = report.imported, failed = report.failed, "System studies imported");
        Ok(report)
    }

    /// Sync the system repository and import its studies list
    pub async fn system(&self, local: bool) -> Result<ImportReport, ImportError> {
        self.update_system_repo(local).await?;
        let path = self.config.system_repo_path().join(STUDIES_FILE);
        self.import_system_studies(&path).await
    }
}

async fn sync_checkout(checkout: &GitRepository, local: bool) -> Result<Option<String>, ImportError> {
    if !local {
        return checkout.pull_or_clone().await.map(Some);
    }
    if !checkout.is_cloned() {
        return Ok(None);
    }
    checkout.head_commit().await.map(Some)
}

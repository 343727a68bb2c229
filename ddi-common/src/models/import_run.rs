//! Import run bookkeeping
//!
//! One `ImportRun` per orchestrated import of a study. Jobs are tracked per
//! entity key so a partial run shows exactly which entity types failed or
//! were skipped behind a failed predecessor.

use super::Entity;
use crate::db::schema::Table;
use crate::db::tables;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall run state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Running,
    /// Every job completed
    Completed,
    /// Some jobs failed or were skipped
    Partial,
    /// No job completed
    Failed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Partial => "partial",
            RunState::Failed => "failed",
        }
    }
}

/// State of one entity job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    /// Not run because a predecessor failed
    Skipped,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Skipped => "skipped",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Skipped)
    }
}

/// Outcome of one entity job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRecord {
    pub state: JobState,
    pub files: Vec<String>,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRun {
    /// Run id (random, unlike entity ids)
    pub id: Uuid,
    pub study_id: Option<Uuid>,
    pub study_name: String,
    pub state: RunState,
    /// Jobs keyed by entity key, in import order
    pub jobs: IndexMap<String, JobRecord>,
    /// Repository commit the run imported
    pub commit_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportRun {
    pub fn new(study_id: Option<Uuid>, study_name: &str, commit_hash: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            study_id,
            study_name: study_name.to_string(),
            state: RunState::Running,
            jobs: IndexMap::new(),
            commit_hash,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Register a job in pending state
    pub fn add_job(&mut self, entity: &str) {
        self.jobs.entry(entity.to_string()).or_default();
    }

    pub fn job_mut(&mut self, entity: &str) -> &mut JobRecord {
        self.jobs.entry(entity.to_string()).or_default()
    }

    /// Derive the final state from the job states and stamp the end time
    pub fn finish(&mut self) -> RunState {
        let total = self.jobs.len();
        let completed = self
            .jobs
            .values()
            .filter(|j| j.state == JobState::Completed)
            .count();

        self.state = if completed == total {
            RunState::Completed
        } else if completed == 0 {
            RunState::Failed
        } else {
            RunState::Partial
        };
        self.finished_at = Some(Utc::now());
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state != RunState::Running
    }
}

impl Entity for ImportRun {
    fn table() -> &'static Table {
        &tables::IMPORT_RUNS
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_states() {
        let mut run = ImportRun::new(None, "soep-test", None);
        run.add_job("study");
        run.add_job("topics");
        run.job_mut("study").state = JobState::Completed;
        run.job_mut("topics").state = JobState::Completed;
        assert_eq!(run.finish(), RunState::Completed);
        assert!(run.finished_at.is_some());

        run.job_mut("topics").state = JobState::Skipped;
        assert_eq!(run.finish(), RunState::Partial);

        run.job_mut("study").state = JobState::Failed;
        assert_eq!(run.finish(), RunState::Failed);
    }

    #[test]
    fn test_record_round_trip_keeps_job_order() {
        let mut run = ImportRun::new(Some(Uuid::new_v4()), "soep-test", Some("abc123".into()));
        for key in ["study", "topics", "concepts"] {
            run.add_job(key);
        }

        let record = run.to_record().unwrap();
        assert_eq!(record["state"], "running");
        let back = ImportRun::from_record(record).unwrap();
        let keys: Vec<_> = back.jobs.keys().cloned().collect();
        assert_eq!(keys, vec!["study", "topics", "concepts"]);
    }
}

//! Bounded job queue with dependency barriers
//!
//! Every job is a tokio task. At most `workers` jobs execute at once; a job
//! first waits for its predecessors and only then takes a worker slot, so a
//! small pool never deadlocks on a chain of barriers. Handles are shared
//! futures and may be awaited any number of times.

use crate::importers::ImportReport;
use crate::ImportError;
use ddi_common::models::JobState;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Work submitted to the queue
pub type Job = BoxFuture<'static, Result<ImportReport, ImportError>>;

/// Terminal outcome of a job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(ImportReport),
    Failed(String),
    /// Not run; names the predecessor that did not complete
    Skipped(String),
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }

    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed(_) => JobState::Completed,
            JobOutcome::Failed(_) => JobState::Failed,
            JobOutcome::Skipped(_) => JobState::Skipped,
        }
    }

    pub fn report(&self) -> ImportReport {
        match self {
            JobOutcome::Completed(report) => *report,
            _ => ImportReport::default(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobOutcome::Completed(_) => None,
            JobOutcome::Failed(message) | JobOutcome::Skipped(message) => Some(message),
        }
    }
}

/// Awaitable handle of a submitted job
#[derive(Clone)]
pub struct JobHandle {
    pub id: Uuid,
    pub name: String,
    outcome: Shared<BoxFuture<'static, JobOutcome>>,
}

impl JobHandle {
    /// Wait for the job to reach a terminal state
    pub async fn wait(&self) -> JobOutcome {
        self.outcome.clone().await
    }

    /// Outcome if the job already finished
    pub fn peek(&self) -> Option<JobOutcome> {
        self.outcome.peek().cloned()
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Clone)]
pub struct JobQueue {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl JobQueue {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        info!("Job queue started with {} workers", workers);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs that could start right now
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawn `job` once every predecessor has completed
    ///
    /// If any predecessor failed or was skipped, the job is skipped without
    /// running.
    pub fn submit(&self, name: impl Into<String>, predecessors: Vec<JobHandle>, job: Job) -> JobHandle {
        let id = Uuid::new_v4();
        let name = name.into();
        let permits = Arc::clone(&self.permits);
        let task_name = name.clone();

        let task = tokio::spawn(async move {
            for predecessor in &predecessors {
                let outcome = predecessor.wait().await;
                if !outcome.is_completed() {
                    let reason = format!("predecessor {} {}", predecessor.name, outcome.state().as_str());
                    info!(job = %task_name, %reason, "Job skipped");
                    return JobOutcome::Skipped(reason);
                }
            }

            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return JobOutcome::Failed("job queue closed".to_string()),
            };

            debug!(job = %task_name, "Job started");
            match job.await {
                Ok(report) => JobOutcome::Completed(report),
                Err(e) => {
                    error!(job = %task_name, error = %e, "Job failed");
                    JobOutcome::Failed(e.to_string())
                }
            }
        });

        let outcome = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => JobOutcome::Failed(format!("job task ended abnormally: {}", e)),
            }
        }
        .boxed()
        .shared();

        JobHandle { id, name, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ok(imported: usize) -> Job {
        async move {
            Ok(ImportReport {
                imported,
                ..Default::default()
            })
        }
        .boxed()
    }

    #[tokio::test]
    async fn test_job_completes() {
        let queue = JobQueue::new(2);
        let handle = queue.submit("a", vec![], ok(3));
        assert_eq!(handle.wait().await.report().imported, 3);
        // handles can be awaited again
        assert!(handle.wait().await.is_completed());
    }

    #[tokio::test]
    async fn test_failed_predecessor_skips_dependents() {
        let queue = JobQueue::new(2);
        let failing = queue.submit(
            "a",
            vec![],
            async { Err(ImportError::row("a", "broken")) }.boxed(),
        );
        let dependent = queue.submit("b", vec![failing.clone()], ok(1));
        let transitive = queue.submit("c", vec![dependent.clone()], ok(1));

        assert_eq!(failing.wait().await.state(), JobState::Failed);
        assert_eq!(dependent.wait().await.state(), JobState::Skipped);
        assert_eq!(transitive.wait().await.state(), JobState::Skipped);
        assert_eq!(dependent.wait().await.error(), Some("predecessor a failed"));
    }

    #[tokio::test]
    async fn test_barrier_orders_execution() {
        let queue = JobQueue::new(4);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first_order = order.clone();
        let first = queue.submit(
            "first",
            vec![],
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                first_order.lock().unwrap().push("first");
                Ok(ImportReport::default())
            }
            .boxed(),
        );
        let second_order = order.clone();
        let second = queue.submit(
            "second",
            vec![first],
            async move {
                second_order.lock().unwrap().push("second");
                Ok(ImportReport::default())
            }
            .boxed(),
        );

        assert!(second.wait().await.is_completed());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let queue = JobQueue::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                queue.submit(
                    format!("job{}", i),
                    vec![],
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(ImportReport::default())
                    }
                    .boxed(),
                )
            })
            .collect();

        for handle in handles {
            assert!(handle.wait().await.is_completed());
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}

//! Bounded worker pool for per-notebook jobs.
//!
//! Jobs are dispatched onto the tokio runtime behind a semaphore, so at most
//! `concurrency` external tool processes run at once. Every dispatched job is
//! awaited before the pool reports, even when some of them fail.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};

use crate::error::{BatchError, JobFailure, Result};
use crate::tools::NotebookTools;

const LOG_TARGET: &str = "batch_nbconvert::pool";

/// What a job does to its notebook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Strip outputs in place
    Strip,
    /// Execute in place with a per-cell timeout
    Execute { cell_timeout_secs: u64 },
}

/// A unit of work: one operation on one notebook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub path: PathBuf,
    pub kind: JobKind,
}

impl Job {
    /// Create a strip job
    pub fn strip(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: JobKind::Strip,
        }
    }

    /// Create an execute job
    pub fn execute(path: impl Into<PathBuf>, cell_timeout_secs: u64) -> Self {
        Self {
            path: path.into(),
            kind: JobKind::Execute { cell_timeout_secs },
        }
    }

    /// Run the job against the given tools
    pub async fn run(&self, tools: &dyn NotebookTools) -> Result<()> {
        match self.kind {
            JobKind::Strip => tools.strip_in_place(&self.path).await,
            JobKind::Execute { cell_timeout_secs } => {
                tools.execute_in_place(&self.path, cell_timeout_secs).await
            }
        }
    }
}

/// Outcome of a fully successful batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    pub completed: usize,
}

/// Runs independent jobs with bounded concurrency
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    /// Create a pool; a concurrency of 0 is treated as 1
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Get the concurrency bound
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every job exactly once.
    ///
    /// Returns [`BatchError::JobsFailed`] listing all failed jobs once every
    /// dispatched job has returned.
    pub async fn run_all(&self, jobs: Vec<Job>, tools: Arc<dyn NotebookTools>) -> Result<PoolSummary> {
        let total = jobs.len();
        log::info!(
            target: LOG_TARGET,
            "Running {} jobs with concurrency {}",
            total,
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        let mut in_flight: HashMap<Id, PathBuf> = HashMap::new();
        let mut failures = Vec::new();
        let mut completed = 0;

        for job in jobs {
            // The semaphore is never closed, acquire only fails if it is
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    failures.push(JobFailure {
                        path: job.path,
                        error: BatchError::Worker(format!("Worker pool closed: {}", e)),
                    });
                    continue;
                }
            };

            log::trace!(target: LOG_TARGET, "Dispatching {}", job.path.display());
            let tools = Arc::clone(&tools);
            let path = job.path.clone();
            let handle = set.spawn(async move {
                let _permit = permit;
                job.run(tools.as_ref()).await
            });
            in_flight.insert(handle.id(), path);
        }

        while let Some(joined) = set.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (e.id(), Err(BatchError::Worker(format!("Job panicked: {}", e)))),
            };
            let path = in_flight.remove(&id).unwrap_or_default();
            match result {
                Ok(()) => completed += 1,
                Err(error) => failures.push(JobFailure { path, error }),
            }
        }

        if !failures.is_empty() {
            failures.sort_by(|a, b| a.path.cmp(&b.path));
            log::warn!(
                target: LOG_TARGET,
                "{} of {} jobs failed",
                failures.len(),
                total
            );
            return Err(BatchError::JobsFailed { total, failures });
        }

        log::info!(target: LOG_TARGET, "All {} jobs completed", completed);
        Ok(PoolSummary { completed })
    }
}

/// Build one strip job per notebook
pub fn strip_jobs(notebooks: &[PathBuf]) -> Vec<Job> {
    notebooks.iter().map(Job::strip).collect()
}

/// Build one execute job per notebook
pub fn execute_jobs(notebooks: &[PathBuf], cell_timeout_secs: u64) -> Vec<Job> {
    notebooks
        .iter()
        .map(|p| Job::execute(p, cell_timeout_secs))
        .collect()
}

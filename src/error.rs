//! Error types for batch-nbconvert

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for batch conversion operations
#[derive(Debug, Error)]
pub enum BatchError {
    /// Destination already exists and clobbering was not requested
    #[error("Destination {} already exists; pass clobber to overwrite it", .0.display())]
    DestinationExists(PathBuf),

    /// Filesystem failure while snapshotting a tree
    #[error("Copy error at {}: {source}", .path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// External strip/execute tool failed or could not be started
    #[error("{tool} failed on {} (exit code: {exit_code:?}): {stderr}", .path.display())]
    Tool {
        tool: String,
        path: PathBuf,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Version-control lookup or init failed
    #[error("VCS error: {0}")]
    Vcs(String),

    /// Manifest could not be persisted
    #[error("Failed to write manifest {}: {source}", .path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more jobs in a batch failed
    #[error("{} of {total} jobs failed; first failure: {}", .failures.len(), first_failure(.failures))]
    JobsFailed { total: usize, failures: Vec<JobFailure> },

    /// A worker task died without producing a result
    #[error("Worker error: {0}")]
    Worker(String),

    /// Invalid settings (bad pattern, non-UTF-8 path, ...)
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single failed job inside a batch
#[derive(Debug)]
pub struct JobFailure {
    pub path: PathBuf,
    pub error: BatchError,
}

fn first_failure(failures: &[JobFailure]) -> String {
    match failures.first() {
        Some(f) => format!("{}: {}", f.path.display(), f.error),
        None => "none".to_string(),
    }
}

/// Result type alias for batch operations
pub type Result<T> = std::result::Result<T, BatchError>;

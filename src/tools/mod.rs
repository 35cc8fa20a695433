//! External notebook tools - stripping and execution
//!
//! The pipelines treat the notebook tools as black boxes behind the
//! [`NotebookTools`] trait. [`CommandTools`] runs the real executables
//! (`nbstripout`, `jupyter nbconvert`) as child processes.

mod command;

pub use command::{CommandTools, ToolCommand, ToolSettings};

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Output format used when a notebook is executed in place
pub const NOTEBOOK_FORMAT: &str = "notebook";

/// Per-file operations performed by external notebook tools
#[async_trait]
pub trait NotebookTools: Send + Sync {
    /// Remove outputs and execution counts from `path`, rewriting it in place
    async fn strip_in_place(&self, path: &Path) -> Result<()>;

    /// Run every cell of `path` and overwrite it with the results
    async fn execute_in_place(&self, path: &Path, cell_timeout_secs: u64) -> Result<()>;

    /// Execute `path`, render it as `format` and write the result to `destination`
    async fn execute_to_copy(&self, path: &Path, destination: &Path, format: &str) -> Result<()>;
}

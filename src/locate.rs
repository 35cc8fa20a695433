//! Notebook discovery.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::{BatchError, Result};
use crate::snapshot::is_vcs_metadata;

const LOG_TARGET: &str = "batch_nbconvert::locate";

/// File extension of notebook documents.
pub const NOTEBOOK_EXTENSION: &str = "ipynb";

/// Directory where Jupyter keeps autosaved copies of open notebooks.
pub const CHECKPOINT_DIR: &str = ".ipynb_checkpoints";

/// Find every notebook under `directory`, at any depth.
///
/// Returned paths are absolute, sorted and free of duplicates. Hidden files
/// and directories are searched too; only Jupyter checkpoint copies and
/// version-control metadata are skipped.
pub fn find_notebooks(directory: &Path) -> Result<Vec<PathBuf>> {
    let root = directory.canonicalize()?;
    let root_str = root
        .to_str()
        .ok_or_else(|| BatchError::Config(format!("Non UTF-8 directory: {}", root.display())))?;

    let pattern = format!("{}/**/*.{}", Pattern::escape(root_str), NOTEBOOK_EXTENSION);
    let options = MatchOptions {
        require_literal_leading_dot: false,
        ..MatchOptions::new()
    };

    let entries = glob::glob_with(&pattern, options)
        .map_err(|e| BatchError::Config(format!("Invalid notebook pattern {}: {}", pattern, e)))?;

    let mut notebooks = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| BatchError::Io(e.into_error()))?;
        if path.is_file() && !is_excluded(&root, &path) {
            notebooks.push(path);
        }
    }
    notebooks.sort();
    notebooks.dedup();

    log::debug!(
        target: LOG_TARGET,
        "Found {} notebooks under {}",
        notebooks.len(),
        root.display()
    );
    Ok(notebooks)
}

/// True if any component below `root` is a checkpoint or VCS directory.
fn is_excluded(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut dirs = relative.components().rev().skip(1);
    dirs.any(|c| {
        let name = c.as_os_str().to_string_lossy();
        name == CHECKPOINT_DIR || is_vcs_metadata(&name)
    })
}

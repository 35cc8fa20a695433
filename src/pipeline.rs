//! Pipelines composing snapshot, discovery, the worker pool and the manifest
//! into the user-facing batch operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{BatchError, Result};
use crate::locate::find_notebooks;
use crate::manifest::{MANIFEST_NAME, Manifest};
use crate::pool::{WorkerPool, execute_jobs, strip_jobs};
use crate::snapshot::{DirectorySnapshotter, SnapshotStats};
use crate::tools::{NOTEBOOK_FORMAT, NotebookTools};
use crate::vcs::Vcs;

const LOG_TARGET: &str = "batch_nbconvert::pipeline";

/// What a directory pipeline did
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Notebooks that were processed
    pub notebooks: Vec<PathBuf>,
    /// Snapshot counts, for pipelines that copy a tree
    pub snapshot: Option<SnapshotStats>,
    /// Source revision, for pipelines that record one
    pub revision: Option<String>,
    /// Manifest written, for execute pipelines
    pub manifest: Option<PathBuf>,
}

/// Batch operations over notebook trees
pub struct Pipeline {
    tools: Arc<dyn NotebookTools>,
    vcs: Arc<dyn Vcs>,
    manifest_name: String,
}

impl Pipeline {
    /// Create a pipeline using the given tools and version-control provider
    pub fn new(tools: Arc<dyn NotebookTools>, vcs: Arc<dyn Vcs>) -> Self {
        Self {
            tools,
            vcs,
            manifest_name: MANIFEST_NAME.to_string(),
        }
    }

    /// Use a different manifest file name
    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    /// Get the manifest file name
    pub fn manifest_name(&self) -> &str {
        &self.manifest_name
    }

    /// Snapshot `src` into a fresh repository at `dst`, then strip every notebook there.
    pub async fn strip_copy(&self, src: &Path, dst: &Path, parallel: usize, clobber: bool) -> Result<BatchReport> {
        let stats = DirectorySnapshotter::new(self.vcs.as_ref()).snapshot(src, dst, clobber)?;
        let mut report = self.strip_inplace(dst, parallel).await?;
        report.snapshot = Some(stats);
        Ok(report)
    }

    /// Strip every notebook under `dir` in place.
    pub async fn strip_inplace(&self, dir: &Path, parallel: usize) -> Result<BatchReport> {
        let notebooks = find_notebooks(dir)?;
        log::info!(
            target: LOG_TARGET,
            "Stripping {} notebooks under {}",
            notebooks.len(),
            dir.display()
        );

        WorkerPool::new(parallel)
            .run_all(strip_jobs(&notebooks), Arc::clone(&self.tools))
            .await?;

        Ok(BatchReport {
            notebooks,
            ..Default::default()
        })
    }

    /// Build `dst` from `src`: snapshot, execute every notebook in place and
    /// record the source revision in a fresh manifest.
    ///
    /// The revision is read before anything is copied. No manifest is written
    /// if any notebook fails.
    pub async fn exec_copy(
        &self,
        src: &Path,
        dst: &Path,
        parallel: usize,
        clobber: bool,
        cell_timeout_secs: u64,
    ) -> Result<BatchReport> {
        let revision = self.vcs.revision(src)?;
        log::info!(target: LOG_TARGET, "Building {} at revision {}", src.display(), revision);

        let stats = DirectorySnapshotter::new(self.vcs.as_ref()).snapshot(src, dst, clobber)?;
        let notebooks = find_notebooks(dst)?;

        WorkerPool::new(parallel)
            .run_all(execute_jobs(&notebooks, cell_timeout_secs), Arc::clone(&self.tools))
            .await?;

        log::info!(target: LOG_TARGET, "Writing manifest indicating revision {}", revision);
        let manifest = Manifest::for_notebooks(&notebooks, &revision).write(dst, &self.manifest_name)?;

        Ok(BatchReport {
            notebooks,
            snapshot: Some(stats),
            revision: Some(revision),
            manifest: Some(manifest),
        })
    }

    /// Execute a single notebook in place.
    pub async fn exec_file_inplace(&self, path: &Path, cell_timeout_secs: u64) -> Result<()> {
        self.tools.execute_in_place(path, cell_timeout_secs).await
    }

    /// Execute a single notebook and write the rendered result to `destination`.
    pub async fn exec_file_copy(&self, path: &Path, destination: &Path, format: &str) -> Result<()> {
        self.tools.execute_to_copy(path, destination, format).await
    }

    /// Render one notebook from a git working copy into `dst_dir`, at the
    /// same repository-relative path, and add it to the manifest there.
    ///
    /// Unlike [`Pipeline::exec_copy`] this merges into an existing manifest.
    /// Returns the canonical path of the rendered file, which is also its
    /// manifest key.
    pub async fn exec_into(&self, notebook: &Path, dst_dir: &Path, format: &str) -> Result<PathBuf> {
        let notebook = notebook.canonicalize()?;
        let containing = notebook
            .parent()
            .ok_or_else(|| BatchError::Config(format!("{} has no parent directory", notebook.display())))?;

        let root = self.vcs.toplevel(containing)?.canonicalize()?;
        let relative = notebook.strip_prefix(&root).map_err(|_| {
            BatchError::Vcs(format!(
                "{} is not inside repository {}",
                notebook.display(),
                root.display()
            ))
        })?;
        let revision = self.vcs.revision(&root)?;

        let mut destination = dst_dir.join(relative);
        if let Some(ext) = rendered_extension(format) {
            destination.set_extension(ext);
        }

        self.tools.execute_to_copy(&notebook, &destination, format).await?;
        // Same key form as exec_copy, whatever shape dst_dir was given in
        let destination = destination.canonicalize()?;

        let mut manifest = Manifest::load(dst_dir, &self.manifest_name)?.unwrap_or_default();
        manifest.insert(&destination, &revision);
        manifest.write(dst_dir, &self.manifest_name)?;

        Ok(destination)
    }
}

/// File extension for a rendered format; `None` keeps the notebook extension.
pub fn rendered_extension(format: &str) -> Option<&'static str> {
    match format {
        NOTEBOOK_FORMAT => None,
        "html" | "slides" => Some("html"),
        "markdown" => Some("md"),
        "python" | "script" => Some("py"),
        "latex" => Some("tex"),
        "pdf" | "webpdf" => Some("pdf"),
        "rst" => Some("rst"),
        "asciidoc" => Some("asciidoc"),
        _ => Some("txt"),
    }
}

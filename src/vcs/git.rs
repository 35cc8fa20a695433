//! GitCli shells out to the `git` executable for the handful of
//! version-control operations the pipelines need.

use crate::error::{BatchError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use super::Vcs;

const LOG_TARGET: &str = "batch_nbconvert::vcs";

/// Version-control provider backed by the git command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    /// Program to invoke (usually just `git`)
    program: String,
}

impl GitCli {
    /// Create a provider that invokes the given git executable.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Get the configured git program.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run git with `args` inside `dir`, failing on spawn errors or non-zero exit.
    fn git(&self, dir: &Path, args: &[&str], action: &str) -> Result<Output> {
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(|e| BatchError::Vcs(format!("Failed to execute {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BatchError::Vcs(format!(
                "Failed to {} in {}: {}",
                action,
                dir.display(),
                stderr.trim()
            )));
        }

        Ok(output)
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl Vcs for GitCli {
    fn init(&self, path: &Path) -> Result<()> {
        log::debug!(target: LOG_TARGET, "git init in {}", path.display());
        self.git(path, &["init", "--quiet"], "initialize repository")?;
        Ok(())
    }

    fn revision(&self, path: &Path) -> Result<String> {
        let output = self.git(path, &["rev-parse", "HEAD"], "read revision")?;
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if sha.is_empty() {
            return Err(BatchError::Vcs(format!("Empty revision for {}", path.display())));
        }
        Ok(sha)
    }

    fn toplevel(&self, path: &Path) -> Result<PathBuf> {
        let output = self.git(path, &["rev-parse", "--show-toplevel"], "find repository root")?;
        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(PathBuf::from(root))
    }
}

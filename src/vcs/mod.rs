//! Version-control provider.
//!
//! The pipelines only need three things from version control: initialize a
//! fresh repository in a snapshot, read the revision a source tree is at, and
//! find the root of the repository containing a path.

mod git;

pub use git::GitCli;

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Trait for the external version-control collaborator
pub trait Vcs: Send + Sync {
    /// Initialize a repository rooted at `path`
    fn init(&self, path: &Path) -> Result<()>;

    /// Current revision identifier of the repository at (or containing) `path`
    fn revision(&self, path: &Path) -> Result<String>;

    /// Root directory of the repository containing `path`
    fn toplevel(&self, path: &Path) -> Result<PathBuf>;
}

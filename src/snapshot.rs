//! Directory snapshotting.
//!
//! A snapshot copies a source tree into a destination tree, skipping every
//! version-control metadata entry (`.git`, `.gitignore`, `.gitmodules`, ...)
//! at every level, and then initializes a fresh repository in the
//! destination. Existing destinations are only touched when clobbering is
//! requested.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{BatchError, Result};
use crate::vcs::Vcs;

const LOG_TARGET: &str = "batch_nbconvert::snapshot";

/// Entry names starting with this prefix are version-control metadata.
pub const VCS_METADATA_PREFIX: &str = ".git";

/// Guard against symlink loops when following directory links.
const MAX_DIRECTORY_DEPTH: usize = 64;

/// Returns true if an entry name denotes version-control metadata.
pub fn is_vcs_metadata(name: &str) -> bool {
    name.starts_with(VCS_METADATA_PREFIX)
}

/// Counts of what a snapshot copied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub files: usize,
    pub directories: usize,
}

/// Copies source trees into fresh repositories.
pub struct DirectorySnapshotter<'a> {
    vcs: &'a dyn Vcs,
}

impl<'a> DirectorySnapshotter<'a> {
    /// Create a snapshotter that initializes destinations with `vcs`.
    pub fn new(vcs: &'a dyn Vcs) -> Self {
        Self { vcs }
    }

    /// Copy `source` into `destination` and initialize a repository there.
    ///
    /// Fails with [`BatchError::DestinationExists`] without touching anything
    /// when `destination` exists and `clobber` is false. With `clobber`, the
    /// existing destination content is removed first, except for its
    /// version-control metadata. A failed copy is not rolled back.
    pub fn snapshot(&self, source: &Path, destination: &Path, clobber: bool) -> Result<SnapshotStats> {
        let source_meta = fs::metadata(source).map_err(|e| copy_err(source, e))?;
        if !source_meta.is_dir() {
            return Err(copy_err(
                source,
                io::Error::new(io::ErrorKind::InvalidInput, "source is not a directory"),
            ));
        }

        // symlink_metadata so a dangling link still counts as existing
        let exists = fs::symlink_metadata(destination).is_ok();
        if exists && !clobber {
            return Err(BatchError::DestinationExists(destination.to_path_buf()));
        }

        ensure_not_nested(source, destination)?;

        if exists {
            log::info!(target: LOG_TARGET, "Removing existing content of {}", destination.display());
            clear_destination(destination)?;
        }

        log::info!(
            target: LOG_TARGET,
            "Copying {} to {}",
            source.display(),
            destination.display()
        );
        fs::create_dir_all(destination).map_err(|e| copy_err(destination, e))?;

        let mut stats = SnapshotStats::default();
        copy_tree(source, destination, 0, &mut stats)?;
        log::debug!(
            target: LOG_TARGET,
            "Copied {} files in {} directories",
            stats.files,
            stats.directories
        );

        self.vcs.init(destination)?;
        Ok(stats)
    }
}

fn copy_err(path: &Path, source: io::Error) -> BatchError {
    BatchError::Copy {
        path: path.to_path_buf(),
        source,
    }
}

/// Resolve a path that may not exist yet.
///
/// Canonicalizes the nearest existing ancestor and re-appends the missing
/// components. Falls back to the lexical absolute path when no ancestor
/// resolves.
fn resolve(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).map_err(|e| copy_err(path, e))?;

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(mut real) = existing.canonicalize() {
            // Missing directories will be created as real directories, so
            // `..` among them steps back lexically
            for part in missing.iter().rev() {
                match part {
                    Component::ParentDir => {
                        real.pop();
                    }
                    Component::CurDir => {}
                    other => real.push(other),
                }
            }
            return Ok(real);
        }
        match (existing.parent(), existing.components().next_back()) {
            (Some(parent), Some(last @ (Component::Normal(_) | Component::ParentDir | Component::CurDir))) => {
                missing.push(last);
                existing = parent;
            }
            _ => return Ok(absolute.clone()),
        }
    }
}

/// Reject a destination that overlaps the source tree in either direction.
fn ensure_not_nested(source: &Path, destination: &Path) -> Result<()> {
    let src = resolve(source)?;
    let dst = resolve(destination)?;

    let reason = if dst.starts_with(&src) {
        "destination must not be inside the source tree"
    } else if src.starts_with(&dst) {
        "destination must not contain the source tree"
    } else {
        return Ok(());
    };

    Err(copy_err(
        destination,
        io::Error::new(io::ErrorKind::InvalidInput, reason),
    ))
}

/// Remove everything in `destination` except version-control metadata.
fn clear_destination(destination: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(destination).map_err(|e| copy_err(destination, e))?;
    if !meta.is_dir() {
        return fs::remove_file(destination).map_err(|e| copy_err(destination, e));
    }

    for entry in fs::read_dir(destination).map_err(|e| copy_err(destination, e))? {
        let entry = entry.map_err(|e| copy_err(destination, e))?;
        let name = entry.file_name();
        if is_vcs_metadata(&name.to_string_lossy()) {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| copy_err(&path, e))?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path).map_err(|e| copy_err(&path, e))?;
        } else {
            fs::remove_file(&path).map_err(|e| copy_err(&path, e))?;
        }
    }

    Ok(())
}

/// Recursively copy the children of `source` into the existing `dest`.
fn copy_tree(source: &Path, dest: &Path, depth: usize, stats: &mut SnapshotStats) -> Result<()> {
    if depth >= MAX_DIRECTORY_DEPTH {
        return Err(copy_err(
            source,
            io::Error::other(format!(
                "maximum directory depth ({}) exceeded, possible symlink loop",
                MAX_DIRECTORY_DEPTH
            )),
        ));
    }

    for entry in fs::read_dir(source).map_err(|e| copy_err(source, e))? {
        let entry = entry.map_err(|e| copy_err(source, e))?;
        let name = entry.file_name();
        if is_vcs_metadata(&name.to_string_lossy()) {
            log::trace!(target: LOG_TARGET, "Skipping {}", entry.path().display());
            continue;
        }

        let source_path = entry.path();
        let dest_path = dest.join(&name);

        // Follow symlinks so the destination holds real content
        let meta = fs::metadata(&source_path).map_err(|e| copy_err(&source_path, e))?;
        if meta.is_dir() {
            fs::create_dir(&dest_path).map_err(|e| copy_err(&dest_path, e))?;
            stats.directories += 1;
            copy_tree(&source_path, &dest_path, depth + 1, stats)?;
        } else {
            fs::copy(&source_path, &dest_path).map_err(|e| copy_err(&source_path, e))?;
            stats.files += 1;
        }
    }

    Ok(())
}

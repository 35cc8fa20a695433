//! Build manifest: which source revision each rendered notebook came from.
//!
//! The manifest is a flat JSON object stored at the root of the destination
//! tree, mapping notebook paths to revision identifiers. It is written through
//! a temporary sibling file and renamed into place.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BatchError, Result};

const LOG_TARGET: &str = "batch_nbconvert::manifest";

/// Default manifest file name
pub const MANIFEST_NAME: &str = "nbconvert_manifest.json";

/// Mapping from notebook path to source revision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every notebook to the same revision
    pub fn for_notebooks(notebooks: &[PathBuf], revision: &str) -> Self {
        let mut manifest = Self::new();
        for nb in notebooks {
            manifest.insert(nb, revision);
        }
        manifest
    }

    /// Record (or replace) the revision for a notebook
    pub fn insert(&mut self, notebook: &Path, revision: &str) {
        self.entries
            .insert(notebook.to_string_lossy().into_owned(), revision.to_string());
    }

    /// Get the revision recorded for a notebook
    pub fn get(&self, notebook: &Path) -> Option<&str> {
        self.entries
            .get(notebook.to_string_lossy().as_ref())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Location of the manifest inside a destination tree
    pub fn path_in(destination_tree: &Path, name: &str) -> PathBuf {
        destination_tree.join(name)
    }

    /// Load the manifest from a destination tree; `None` if there is none yet
    pub fn load(destination_tree: &Path, name: &str) -> Result<Option<Self>> {
        let path = Self::path_in(destination_tree, name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest = serde_json::from_str(&content)?;
        Ok(Some(manifest))
    }

    /// Write the manifest into a destination tree, replacing any existing one
    pub fn write(&self, destination_tree: &Path, name: &str) -> Result<PathBuf> {
        let path = Self::path_in(destination_tree, name);
        let tmp = destination_tree.join(format!(".{}.tmp", name));
        let json = serde_json::to_string_pretty(self)?;

        let write_err = |source: io::Error| BatchError::ManifestWrite {
            path: path.clone(),
            source,
        };
        fs::write(&tmp, format!("{}\n", json)).map_err(write_err)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }

        log::info!(
            target: LOG_TARGET,
            "Wrote manifest with {} entries to {}",
            self.len(),
            path.display()
        );
        Ok(path)
    }
}

/// Write `mapping` as the manifest of `destination_tree` under the default name
pub fn write_manifest(mapping: &Manifest, destination_tree: &Path) -> Result<PathBuf> {
    mapping.write(destination_tree, MANIFEST_NAME)
}

//! Pipeline integration tests
//!
//! Drives the public pipelines with in-process notebook tools and a fake
//! version-control provider, plus one end-to-end run through real git and
//! shell-script tools.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use batch_nbconvert::error::{BatchError, Result};
use batch_nbconvert::locate::find_notebooks;
use batch_nbconvert::manifest::{MANIFEST_NAME, Manifest};
use batch_nbconvert::pool::{Job, WorkerPool};
use batch_nbconvert::snapshot::{DirectorySnapshotter, is_vcs_metadata};
use batch_nbconvert::tools::{CommandTools, NotebookTools, ToolCommand, ToolSettings};
use batch_nbconvert::vcs::{GitCli, Vcs};
use batch_nbconvert::Pipeline;
use serde_json::{Value, json};
use tempfile::TempDir;

/// Notebook tools that edit the JSON document directly
#[derive(Default)]
struct JsonTools {
    calls: Mutex<Vec<PathBuf>>,
}

impl JsonTools {
    fn edit(&self, path: &Path, f: impl Fn(&mut Value)) -> Result<()> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        let mut doc: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
        if doc["cells"]
            .as_array()
            .is_some_and(|cells| cells.iter().any(|c| c["source"] == "raise"))
        {
            return Err(BatchError::Tool {
                tool: "execute".to_string(),
                path: path.to_path_buf(),
                exit_code: Some(1),
                stderr: "CellExecutionError".to_string(),
            });
        }
        if let Some(cells) = doc["cells"].as_array_mut() {
            for cell in cells {
                f(cell);
            }
        }
        fs::write(path, serde_json::to_string_pretty(&doc)?)?;
        Ok(())
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl NotebookTools for JsonTools {
    async fn strip_in_place(&self, path: &Path) -> Result<()> {
        self.edit(path, |cell| {
            cell["outputs"] = json!([]);
            cell["execution_count"] = Value::Null;
        })
    }

    async fn execute_in_place(&self, path: &Path, _cell_timeout_secs: u64) -> Result<()> {
        self.edit(path, |cell| {
            cell["outputs"] = json!([{"text": format!("ran {}", cell["source"])}]);
            cell["execution_count"] = json!(1);
        })
    }

    async fn execute_to_copy(&self, path: &Path, destination: &Path, _format: &str) -> Result<()> {
        fs::create_dir_all(destination.parent().unwrap())?;
        fs::copy(path, destination)?;
        self.edit(destination, |cell| cell["outputs"] = json!(["ran"]))
    }
}

/// Version control stand-in with a fixed revision
struct FakeVcs {
    revision: Option<String>,
    inits: Mutex<Vec<PathBuf>>,
}

impl FakeVcs {
    fn at(revision: &str) -> Self {
        Self {
            revision: Some(revision.to_string()),
            inits: Mutex::new(Vec::new()),
        }
    }

    fn not_a_repo() -> Self {
        Self {
            revision: None,
            inits: Mutex::new(Vec::new()),
        }
    }
}

impl Vcs for FakeVcs {
    fn init(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path.join(".git"))?;
        self.inits.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn revision(&self, path: &Path) -> Result<String> {
        self.revision
            .clone()
            .ok_or_else(|| BatchError::Vcs(format!("not a git repository: {}", path.display())))
    }

    fn toplevel(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}

fn notebook(sources: &[&str]) -> String {
    let cells: Vec<Value> = sources
        .iter()
        .map(|s| json!({"cell_type": "code", "source": s, "outputs": [{"text": "stale"}], "execution_count": 7}))
        .collect();
    serde_json::to_string_pretty(&json!({"cells": cells, "nbformat": 4})).unwrap()
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Source tree with five notebooks, some other files and git metadata
fn source_tree(root: &Path) -> PathBuf {
    let src = root.join("src");
    write(&src.join("intro.ipynb"), &notebook(&["print(1)"]));
    write(&src.join("setup.py"), "from setuptools import setup");
    write(&src.join("analysis/a.ipynb"), &notebook(&["x = 1", "x + 1"]));
    write(&src.join("analysis/b.ipynb"), &notebook(&["y = 2"]));
    write(&src.join("analysis/data/raw.csv"), "a,b\n1,2\n");
    write(&src.join("deep/er/still/c.ipynb"), &notebook(&["z"]));
    write(&src.join("deep/d.ipynb"), &notebook(&["w"]));
    write(&src.join(".git/HEAD"), "ref: refs/heads/main");
    write(&src.join(".gitignore"), "*.pyc");
    src
}

/// Relative path -> content for every non-VCS file in a tree
fn tree_contents(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            if is_vcs_metadata(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn pipeline(tools: &Arc<JsonTools>, vcs: &Arc<FakeVcs>) -> Pipeline {
    Pipeline::new(tools.clone(), vcs.clone())
}

#[test]
fn test_snapshot_is_exact_copy_without_vcs_metadata() {
    let temp = TempDir::new().unwrap();
    let src = source_tree(temp.path());
    let dst = temp.path().join("dst");
    let vcs = FakeVcs::at("r1");

    DirectorySnapshotter::new(&vcs).snapshot(&src, &dst, true).unwrap();

    assert_eq!(tree_contents(&src), tree_contents(&dst));
    assert!(!dst.join(".gitignore").exists());
    assert!(dst.join(".git").is_dir());
}

#[test]
fn test_snapshot_without_clobber_leaves_destination_alone() {
    let temp = TempDir::new().unwrap();
    let src = source_tree(temp.path());
    let dst = temp.path().join("dst");
    write(&dst.join("existing.txt"), "keep me");
    let before = tree_contents(&dst);
    let vcs = FakeVcs::at("r1");

    let err = DirectorySnapshotter::new(&vcs)
        .snapshot(&src, &dst, false)
        .unwrap_err();

    assert!(matches!(err, BatchError::DestinationExists(_)));
    assert_eq!(tree_contents(&dst), before);
}

#[tokio::test]
async fn test_strip_copy_strips_every_notebook() {
    let temp = TempDir::new().unwrap();
    let src = source_tree(temp.path());
    let dst = temp.path().join("dst");
    let tools = Arc::new(JsonTools::default());
    let vcs = Arc::new(FakeVcs::at("r1"));

    let report = pipeline(&tools, &vcs).strip_copy(&src, &dst, 2, false).await.unwrap();

    assert_eq!(report.notebooks.len(), 5);
    assert!(report.manifest.is_none());
    for nb in &report.notebooks {
        let doc: Value = serde_json::from_str(&fs::read_to_string(nb).unwrap()).unwrap();
        for cell in doc["cells"].as_array().unwrap() {
            assert_eq!(cell["outputs"], json!([]));
            assert_eq!(cell["execution_count"], Value::Null);
        }
    }
    // Source untouched
    assert!(fs::read_to_string(src.join("intro.ipynb")).unwrap().contains("stale"));
    assert!(!dst.join(MANIFEST_NAME).exists());
}

#[tokio::test]
async fn test_strip_inplace_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let src = source_tree(temp.path());
    let tools = Arc::new(JsonTools::default());
    let vcs = Arc::new(FakeVcs::at("r1"));
    let pipeline = pipeline(&tools, &vcs);

    pipeline.strip_inplace(&src, 3).await.unwrap();
    let once = tree_contents(&src);
    pipeline.strip_inplace(&src, 3).await.unwrap();
    let twice = tree_contents(&src);

    assert_eq!(once, twice);
    assert_eq!(tools.call_count(), 10);
}

#[tokio::test]
async fn test_exec_copy_writes_manifest_for_every_notebook() {
    let temp = TempDir::new().unwrap();
    let src = source_tree(temp.path());
    let dst = temp.path().join("dst");
    let tools = Arc::new(JsonTools::default());
    let vcs = Arc::new(FakeVcs::at("0123abcd"));

    let report = pipeline(&tools, &vcs)
        .exec_copy(&src, &dst, 4, false, 60)
        .await
        .unwrap();

    assert_eq!(report.revision.as_deref(), Some("0123abcd"));
    assert_eq!(report.manifest, Some(dst.join(MANIFEST_NAME)));

    let manifest = Manifest::load(&dst, MANIFEST_NAME).unwrap().unwrap();
    assert_eq!(manifest.len(), 5);
    let dst_root = dst.canonicalize().unwrap();
    for (path, revision) in manifest.iter() {
        assert_eq!(revision, "0123abcd");
        let path = Path::new(path);
        assert!(path.is_file(), "{} missing", path.display());
        assert!(path.starts_with(&dst_root));
    }
    let executed = fs::read_to_string(dst.join("analysis/a.ipynb")).unwrap();
    assert!(executed.contains("ran"));
}

#[tokio::test]
async fn test_exec_copy_failure_writes_no_manifest() {
    let temp = TempDir::new().unwrap();
    let src = source_tree(temp.path());
    write(&src.join("broken.ipynb"), &notebook(&["raise"]));
    let dst = temp.path().join("dst");
    let tools = Arc::new(JsonTools::default());
    let vcs = Arc::new(FakeVcs::at("r1"));

    let err = pipeline(&tools, &vcs)
        .exec_copy(&src, &dst, 3, false, 60)
        .await
        .unwrap_err();

    match &err {
        BatchError::JobsFailed { total, failures } => {
            assert_eq!(*total, 6);
            assert_eq!(failures.len(), 1);
            assert!(failures[0].path.ends_with("broken.ipynb"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Every job ran, the good ones kept their results
    assert_eq!(tools.call_count(), 6);
    assert!(fs::read_to_string(dst.join("intro.ipynb")).unwrap().contains("ran"));
    assert!(!dst.join(MANIFEST_NAME).exists());
}

#[tokio::test]
async fn test_exec_copy_rerun_overwrites_manifest() {
    let temp = TempDir::new().unwrap();
    let src = source_tree(temp.path());
    let dst = temp.path().join("dst");
    let tools = Arc::new(JsonTools::default());

    let first = Arc::new(FakeVcs::at("first"));
    pipeline(&tools, &first).exec_copy(&src, &dst, 2, false, 60).await.unwrap();

    fs::remove_file(src.join("deep/d.ipynb")).unwrap();
    let second = Arc::new(FakeVcs::at("second"));
    pipeline(&tools, &second).exec_copy(&src, &dst, 2, true, 60).await.unwrap();

    let manifest = Manifest::load(&dst, MANIFEST_NAME).unwrap().unwrap();
    assert_eq!(manifest.len(), 4);
    assert!(manifest.iter().all(|(_, rev)| rev == "second"));
    assert!(!dst.join("deep/d.ipynb").exists());
}

#[tokio::test]
async fn test_exec_copy_without_revision_touches_nothing() {
    let temp = TempDir::new().unwrap();
    let src = source_tree(temp.path());
    let dst = temp.path().join("dst");
    let tools = Arc::new(JsonTools::default());
    let vcs = Arc::new(FakeVcs::not_a_repo());

    let err = pipeline(&tools, &vcs)
        .exec_copy(&src, &dst, 2, false, 60)
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::Vcs(_)));
    assert!(!dst.exists());
    assert_eq!(tools.call_count(), 0);
}

#[tokio::test]
async fn test_exec_copy_never_modifies_overlapping_source() {
    let temp = TempDir::new().unwrap();
    let src = source_tree(temp.path());
    let before = tree_contents(&src);
    let tools = Arc::new(JsonTools::default());
    let vcs = Arc::new(FakeVcs::at("r1"));
    let pipeline = pipeline(&tools, &vcs);

    let inside = pipeline.exec_copy(&src, &src.join("new/build"), 2, false, 60).await;
    let around = pipeline.exec_copy(&src, temp.path(), 2, true, 60).await;

    assert!(matches!(inside, Err(BatchError::Copy { .. })));
    assert!(matches!(around, Err(BatchError::Copy { .. })));
    assert_eq!(tree_contents(&src), before);
    assert!(src.join(".git/HEAD").is_file());
    assert_eq!(tools.call_count(), 0);
    assert!(vcs.inits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_pool_reports_failure_after_running_all_jobs() {
    let temp = TempDir::new().unwrap();
    let mut jobs = Vec::new();
    for i in 0..4 {
        let path = temp.path().join(format!("ok{}.ipynb", i));
        write(&path, &notebook(&["1"]));
        jobs.push(Job::execute(path, 10));
    }
    let bad = temp.path().join("bad.ipynb");
    write(&bad, &notebook(&["raise"]));
    jobs.push(Job::execute(bad.clone(), 10));

    let tools = Arc::new(JsonTools::default());
    let err = WorkerPool::new(3).run_all(jobs, tools.clone()).await.unwrap_err();

    assert!(matches!(err, BatchError::JobsFailed { .. }));
    assert!(err.to_string().contains("bad.ipynb"));
    assert_eq!(tools.call_count(), 5);
    for i in 0..4 {
        let content = fs::read_to_string(temp.path().join(format!("ok{}.ipynb", i))).unwrap();
        assert!(content.contains("ran"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_does_not_change_outcome() {
    let temp = TempDir::new().unwrap();
    let src = source_tree(temp.path());
    let tools = Arc::new(JsonTools::default());

    let mut results = Vec::new();
    for parallel in [1, 2, 5, 16] {
        let dst = temp.path().join(format!("dst{}", parallel));
        let vcs = Arc::new(FakeVcs::at("same"));
        pipeline(&tools, &vcs)
            .exec_copy(&src, &dst, parallel, false, 60)
            .await
            .unwrap();
        results.push(tree_contents(&dst));
    }

    // Manifest keys differ by destination, compare everything else
    let strip_manifest = |mut t: BTreeMap<PathBuf, Vec<u8>>| {
        t.remove(Path::new(MANIFEST_NAME));
        t
    };
    let first = strip_manifest(results[0].clone());
    for other in &results[1..] {
        assert_eq!(strip_manifest(other.clone()), first);
    }
}

#[test]
fn test_find_notebooks_matches_snapshot() {
    let temp = TempDir::new().unwrap();
    let src = source_tree(temp.path());
    let found = find_notebooks(&src).unwrap();
    let root = src.canonicalize().unwrap();
    let rel: Vec<PathBuf> = found
        .iter()
        .map(|p| p.strip_prefix(&root).unwrap().to_path_buf())
        .collect();
    assert_eq!(
        rel,
        vec![
            PathBuf::from("analysis/a.ipynb"),
            PathBuf::from("analysis/b.ipynb"),
            PathBuf::from("deep/d.ipynb"),
            PathBuf::from("deep/er/still/c.ipynb"),
            PathBuf::from("intro.ipynb"),
        ]
    );
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git").args(args).current_dir(dir).output().unwrap();
    assert!(output.status.success(), "git {:?} failed", args);
}

/// End to end: real git, tools as shell scripts
#[tokio::test]
async fn test_exec_copy_end_to_end_with_git() {
    let temp = TempDir::new().unwrap();
    let src = source_tree(temp.path());
    fs::remove_dir_all(src.join(".git")).unwrap();
    git(&src, &["init"]);
    git(&src, &["config", "user.email", "test@test.com"]);
    git(&src, &["config", "user.name", "Test"]);
    git(&src, &["add", "."]);
    git(&src, &["commit", "-m", "Initial commit"]);

    let sh = |script: &str| ToolCommand::new("sh").arg("-c").arg(script).arg("tool");
    let tools = Arc::new(CommandTools::new(ToolSettings {
        strip: sh("true"),
        execute: sh(r#"for last; do :; done; printf '{"executed": true}' > "$last""#),
        ..Default::default()
    }));
    let vcs = Arc::new(GitCli::default());
    let dst = temp.path().join("built");

    let report = Pipeline::new(tools, vcs.clone())
        .exec_copy(&src, &dst, 4, false, 30)
        .await
        .unwrap();

    let expected = vcs.revision(&src).unwrap();
    assert_eq!(report.revision.as_deref(), Some(expected.as_str()));
    assert!(dst.join(".git").is_dir());
    assert_eq!(
        fs::read_to_string(dst.join("deep/d.ipynb")).unwrap(),
        r#"{"executed": true}"#
    );

    let manifest = Manifest::load(&dst, MANIFEST_NAME).unwrap().unwrap();
    assert_eq!(manifest.len(), 5);
    assert!(manifest.iter().all(|(_, rev)| rev == expected));
}

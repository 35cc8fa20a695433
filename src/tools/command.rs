//! Child-process implementation of the notebook tools.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::{NOTEBOOK_FORMAT, NotebookTools};
use crate::error::{BatchError, Result};

const LOG_TARGET: &str = "batch_nbconvert::tools";

/// An external program plus the leading arguments it always receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    /// Executable name or path
    pub program: String,
    /// Arguments placed before the per-invocation arguments
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Create a command with no leading arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a leading argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Settings for the external notebook tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Output stripper, receives the notebook path as its last argument
    pub strip: ToolCommand,
    /// Notebook executor, receives nbconvert-style flags and the notebook path
    pub execute: ToolCommand,
    /// Per-cell timeout used when no explicit timeout is given
    pub cell_timeout_secs: u64,
    /// Kill a tool process that runs longer than this (none by default)
    pub process_timeout_secs: Option<u64>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            strip: ToolCommand::new("python").arg("-m").arg("nbstripout"),
            execute: ToolCommand::new("jupyter").arg("nbconvert"),
            cell_timeout_secs: 600,
            process_timeout_secs: None,
        }
    }
}

/// Runs the configured tools as child processes
#[derive(Debug, Clone, Default)]
pub struct CommandTools {
    settings: ToolSettings,
}

impl CommandTools {
    /// Create tools from the given settings
    pub fn new(settings: ToolSettings) -> Self {
        Self { settings }
    }

    /// Get the settings
    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    /// Spawn `command` with `extra` arguments and wait for it to exit successfully.
    async fn run(
        &self,
        tool: &str,
        command: &ToolCommand,
        extra: Vec<OsString>,
        path: &Path,
    ) -> Result<Output> {
        let tool_error = |exit_code: Option<i32>, stderr: String| BatchError::Tool {
            tool: tool.to_string(),
            path: path.to_path_buf(),
            exit_code,
            stderr,
        };

        log::trace!(
            target: LOG_TARGET,
            "{} {} {:?}",
            command.program,
            command.args.join(" "),
            extra
        );

        let child = Command::new(&command.program)
            .args(&command.args)
            .args(&extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| tool_error(None, format!("Failed to spawn {}: {}", command.program, e)))?;

        // Dropping the wait future on timeout kills the child (kill_on_drop)
        let waited = match self.settings.process_timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), child.wait_with_output()).await {
                    Ok(result) => result,
                    Err(_) => {
                        return Err(tool_error(None, format!("Process timed out after {}s", secs)));
                    }
                }
            }
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|e| tool_error(None, format!("IO error: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(tool_error(output.status.code(), stderr));
        }

        Ok(output)
    }

    fn timeout_arg(secs: u64) -> OsString {
        format!("--ExecutePreprocessor.timeout={}", secs).into()
    }
}

fn report<T>(action: &str, path: &Path, result: &Result<T>) {
    match result {
        Ok(_) => log::debug!(target: LOG_TARGET, "{} {} succeeded", action, path.display()),
        Err(e) => log::warn!(target: LOG_TARGET, "{} {} failed: {}", action, path.display(), e),
    }
}

#[async_trait]
impl NotebookTools for CommandTools {
    async fn strip_in_place(&self, path: &Path) -> Result<()> {
        log::info!(target: LOG_TARGET, "Stripping output from {}", path.display());
        let result = self
            .run("strip", &self.settings.strip, vec![path.into()], path)
            .await;
        report("Stripping", path, &result);
        result.map(|_| ())
    }

    async fn execute_in_place(&self, path: &Path, cell_timeout_secs: u64) -> Result<()> {
        log::info!(
            target: LOG_TARGET,
            "Executing {} in place (cell timeout {}s)",
            path.display(),
            cell_timeout_secs
        );
        let extra = vec![
            "--execute".into(),
            "--inplace".into(),
            "--to".into(),
            NOTEBOOK_FORMAT.into(),
            Self::timeout_arg(cell_timeout_secs),
            path.into(),
        ];
        let result = self.run("execute", &self.settings.execute, extra, path).await;
        report("Executing", path, &result);
        result.map(|_| ())
    }

    async fn execute_to_copy(&self, path: &Path, destination: &Path, format: &str) -> Result<()> {
        log::info!(
            target: LOG_TARGET,
            "Executing {} to {} as {}",
            path.display(),
            destination.display(),
            format
        );
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let extra = vec![
            "--execute".into(),
            "--to".into(),
            format.into(),
            Self::timeout_arg(self.settings.cell_timeout_secs),
            "--stdout".into(),
            path.into(),
        ];
        let result = self.run("execute", &self.settings.execute, extra, path).await;
        report("Executing", path, &result);

        let output = result?;
        tokio::fs::write(destination, &output.stdout).await?;
        Ok(())
    }
}

//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - strip-copy / exec-copy: snapshot a repository and process every notebook
//! - strip-inplace: strip every notebook under a directory
//! - exec-file-inplace / exec-file-copy / exec-into: single-notebook variants

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// batch-nbconvert - strip or execute every notebook in a repository
#[derive(Parser, Debug)]
#[command(name = "batch-nbconvert")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy a repository into a fresh one and strip all notebook output
    StripCopy {
        /// Source repository
        src: PathBuf,

        /// Destination directory
        dst: PathBuf,

        /// Number of notebooks to process at once
        #[arg(short, long)]
        parallel: Option<usize>,

        /// Remove existing destination content first
        #[arg(long)]
        clobber: bool,
    },

    /// Strip output from every notebook under a directory, in place
    StripInplace {
        /// Directory to process
        dir: PathBuf,

        /// Number of notebooks to process at once
        #[arg(short, long)]
        parallel: Option<usize>,
    },

    /// Copy a repository into a fresh one, execute every notebook and write a manifest
    ExecCopy {
        /// Source repository
        src: PathBuf,

        /// Destination directory
        dst: PathBuf,

        /// Number of notebooks to process at once
        #[arg(short, long)]
        parallel: Option<usize>,

        /// Remove existing destination content first
        #[arg(long)]
        clobber: bool,

        /// Seconds allowed per cell
        #[arg(short = 't', long)]
        cell_timeout: Option<u64>,
    },

    /// Execute a single notebook in place
    ExecFileInplace {
        /// Notebook to execute
        path: PathBuf,

        /// Seconds allowed per cell
        #[arg(short = 't', long)]
        cell_timeout: Option<u64>,
    },

    /// Execute a single notebook and write the rendered result elsewhere
    ExecFileCopy {
        /// Notebook to execute
        path: PathBuf,

        /// Where to write the rendered result
        destination: PathBuf,

        /// Output format (notebook, html, markdown, ...)
        #[arg(long = "to")]
        format: Option<String>,
    },

    /// Render one notebook into a build directory and add it to its manifest
    ExecInto {
        /// Notebook inside a git working copy
        notebook: PathBuf,

        /// Build directory
        dst: PathBuf,

        /// Output format (notebook, html, markdown, ...)
        #[arg(long = "to")]
        format: Option<String>,
    },
}

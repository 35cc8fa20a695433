//! CLI module for batch-nbconvert - command-line interface and subcommands.
//!
//! Directory-oriented commands (strip-copy, strip-inplace, exec-copy) and
//! file-oriented commands (exec-file-inplace, exec-file-copy, exec-into).

pub mod commands;

pub use commands::Cli;

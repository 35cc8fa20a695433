//! batch-nbconvert - batch stripping and execution of notebook trees
//!
//! Copies a source repository into a fresh repository, then strips or
//! executes every notebook in it with a bounded pool of external tool
//! processes. Execute builds record the source revision in a manifest.

pub mod error;
pub mod locate;
pub mod manifest;
pub mod pipeline;
pub mod pool;
pub mod snapshot;
pub mod tools;
pub mod vcs;

pub use error::{BatchError, Result};
pub use pipeline::{BatchReport, Pipeline};

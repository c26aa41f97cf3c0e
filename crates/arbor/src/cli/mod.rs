//! CLI command implementations.

mod output;

pub mod edge;
pub mod init;
pub mod reconcile;
pub mod report;
pub mod task;
pub mod traverse;

pub use output::OutputMode;

use std::path::Path;

use anyhow::{Context, Result};
use arbor::Engine;

/// Opens the project containing `dir`.
fn open(dir: &Path) -> Result<Engine> {
    Engine::discover(dir).with_context(|| format!("cannot open project at '{}'", dir.display()))
}

//! `arbor init` command implementation.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use super::OutputMode;
use super::output::print_json;

/// Run the init command.
pub fn run(dir: &Path, mode: OutputMode) -> Result<()> {
    let paths = arbor::config::init(dir)?;

    match mode {
        OutputMode::Json => print_json(&json!({
            "root": paths.root(),
            "config": paths.config_file(),
            "tasks": paths.tasks_dir(),
        })),
        OutputMode::Text => {
            println!(
                "{} arbor in {}",
                "Initialized".green().bold(),
                paths.arbor_dir().display()
            );
            println!("  Config: {}", paths.config_file().display());
            println!("  Tasks:  {}", paths.tasks_dir().display());
            Ok(())
        }
    }
}

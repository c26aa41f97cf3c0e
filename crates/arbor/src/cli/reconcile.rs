//! `arbor sync` and `arbor rebuild` command implementations.

use std::path::Path;

use anyhow::Result;
use arbor::Confirmation;
use colored::Colorize;

use super::OutputMode;
use super::output::print_json;

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("  {} {warning}", "warning:".yellow());
    }
}

/// Run the sync command.
pub fn sync(dir: &Path, mode: OutputMode) -> Result<()> {
    let engine = super::open(dir)?;
    let summary = engine.sync()?;

    match mode {
        OutputMode::Json => print_json(&summary),
        OutputMode::Text => {
            if summary.is_clean() && summary.warnings.is_empty() {
                println!("{}", "Store already matches the documents.".green());
            } else {
                println!("{} {summary}", "Synced:".bold());
                print_warnings(&summary.warnings);
            }
            Ok(())
        }
    }
}

/// Run the rebuild command.
pub fn rebuild(dir: &Path, yes: bool, mode: OutputMode) -> Result<()> {
    let engine = super::open(dir)?;
    let summary = match engine.rebuild(Confirmation::from(yes)) {
        Err(arbor::Error::ConfirmationRequired(_)) => {
            anyhow::bail!(
                "rebuild discards store-only state (rows without a valid document); \
                 pass --yes to proceed"
            )
        }
        other => other?,
    };

    match mode {
        OutputMode::Json => print_json(&summary),
        OutputMode::Text => {
            println!("{} {summary}", "Rebuilt:".bold());
            print_warnings(&summary.warnings);
            Ok(())
        }
    }
}

//! `arbor edge` command implementations.

use std::path::Path;

use anyhow::Result;
use arbor::{Edge, PageRequest, TaskId};
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;

use super::OutputMode;
use super::output::print_json;

/// Edge subcommands. `FROM` depends on `TO`.
#[derive(Subcommand, Debug, Clone)]
pub enum EdgeCommand {
    /// Add a dependency
    Add {
        /// Dependent task
        from: TaskId,
        /// Task it depends on
        to: TaskId,
    },

    /// Show one dependency
    Get {
        /// Dependent task
        from: TaskId,
        /// Task it depends on
        to: TaskId,
    },

    /// List dependencies
    List {
        /// Page number (1-based)
        #[arg(long, default_value = "1")]
        page: u32,

        /// Edges per page
        #[arg(long, default_value_t = arbor::pagination::DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },

    /// Remove a dependency
    Delete {
        /// Dependent task
        from: TaskId,
        /// Task it depends on
        to: TaskId,
    },
}

fn edge_line(edge: &Edge) -> String {
    format!(
        "{} {} {}  {}",
        format!("#{}", edge.from).cyan(),
        "→".dimmed(),
        format!("#{}", edge.to).cyan(),
        edge.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
    )
}

/// Run an edge subcommand.
pub fn run(dir: &Path, command: EdgeCommand, mode: OutputMode) -> Result<()> {
    let engine = super::open(dir)?;

    match command {
        EdgeCommand::Add { from, to } => {
            let edge = engine.add_edge(from, to)?;
            match mode {
                OutputMode::Json => print_json(&edge),
                OutputMode::Text => {
                    println!("{} {}", "Added".green().bold(), edge_line(&edge));
                    Ok(())
                }
            }
        }

        EdgeCommand::Get { from, to } => {
            let edge = engine.get_edge(from, to)?;
            match mode {
                OutputMode::Json => print_json(&edge),
                OutputMode::Text => {
                    println!("{}", edge_line(&edge));
                    Ok(())
                }
            }
        }

        EdgeCommand::List { page, page_size } => {
            let page = engine.list_edges(PageRequest::new(page, page_size)?)?;
            if mode == OutputMode::Json {
                return print_json(&page);
            }
            if page.items.is_empty() {
                println!("{}", "No dependencies.".dimmed());
            }
            for edge in &page.items {
                println!("{}", edge_line(edge));
            }
            println!(
                "{}",
                format!(
                    "page {}/{} ({} edges)",
                    page.page, page.total_pages, page.total_items
                )
                .dimmed()
            );
            Ok(())
        }

        EdgeCommand::Delete { from, to } => {
            engine.delete_edge(from, to)?;
            match mode {
                OutputMode::Json => print_json(&json!({ "deleted": { "from": from, "to": to } })),
                OutputMode::Text => {
                    println!("{} #{from} → #{to}", "Removed".green().bold());
                    Ok(())
                }
            }
        }
    }
}

//! Read-only graph reports: `next`, `order`, `cycles`, `stats`, `map`.

use std::path::Path;

use anyhow::Result;
use arbor::TaskStatus;
use colored::Colorize;
use serde_json::json;

use super::OutputMode;
use super::output::{print_json, status_label, task_line};

/// Run the next command.
pub fn next(dir: &Path, mode: OutputMode) -> Result<()> {
    let engine = super::open(dir)?;
    let task = engine.next_executable()?;

    match (mode, task) {
        (OutputMode::Json, task) => print_json(&task),
        (OutputMode::Text, Some(task)) => {
            println!("{}", task_line(&task));
            Ok(())
        }
        (OutputMode::Text, None) => {
            println!("{}", "No task is ready to run.".dimmed());
            Ok(())
        }
    }
}

/// Run the order command.
pub fn order(dir: &Path, mode: OutputMode) -> Result<()> {
    let engine = super::open(dir)?;
    let tasks = engine.topological_order()?;

    if mode == OutputMode::Json {
        return print_json(&tasks);
    }
    for (i, task) in tasks.iter().enumerate() {
        println!("{:>4}. {}", i + 1, task_line(task));
    }
    Ok(())
}

/// Run the cycles command.
pub fn cycles(dir: &Path, mode: OutputMode) -> Result<()> {
    let engine = super::open(dir)?;
    let cycles = engine.cycles()?;

    if mode == OutputMode::Json {
        return print_json(&cycles);
    }
    if cycles.is_empty() {
        println!("{}", "No dependency cycles detected.".green());
        return Ok(());
    }

    println!(
        "Found {} dependency cycles:",
        cycles.len().to_string().red().bold()
    );
    for (i, cycle) in cycles.iter().enumerate() {
        let mut path = cycle
            .iter()
            .map(|id| format!("#{id}"))
            .collect::<Vec<_>>()
            .join(" → ");
        if let Some(first) = cycle.first() {
            path.push_str(&format!(" → #{first}"));
        }
        println!("  {} {}: {}", "Cycle".yellow().bold(), i + 1, path.dimmed());
    }
    Ok(())
}

/// Run the stats command.
pub fn stats(dir: &Path, mode: OutputMode) -> Result<()> {
    let engine = super::open(dir)?;
    let stats = engine.stats()?;

    if mode == OutputMode::Json {
        return print_json(&json!({
            "total": stats.total,
            "leaves": stats.leaves,
            "leaves_by_status": stats.leaves_by_status,
            "edges": stats.edges,
            "db": engine.paths().db_file(),
        }));
    }

    println!("{}", "Arbor Statistics".cyan().bold());
    println!();
    println!(
        "  {}: {} total, {} leaves",
        "Tasks".white().bold(),
        stats.total.to_string().green(),
        stats.leaves
    );
    for status in TaskStatus::ALL {
        let count = stats.leaves_with(status);
        if count > 0 {
            println!("    {}: {count}", status_label(status));
        }
    }
    println!(
        "  {}: {}",
        "Dependencies".white().bold(),
        stats.edges.to_string().green()
    );
    Ok(())
}

/// Run the map command.
pub fn map(dir: &Path, mode: OutputMode) -> Result<()> {
    let engine = super::open(dir)?;
    let map = engine.context_map()?;

    match mode {
        OutputMode::Json => print_json(&json!({ "map": map })),
        OutputMode::Text => {
            print!("{map}");
            Ok(())
        }
    }
}

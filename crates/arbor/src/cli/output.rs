//! Output formatting shared by the commands.
//!
//! Text output is colored (respecting `NO_COLOR` through `colored`) and wraps
//! long document text to the terminal width. JSON output is pretty-printed
//! `serde_json`.

use std::io::{self, Write};

use anyhow::Result;
use arbor::{Task, TaskStatus};
use colored::{ColoredString, Colorize};
use serde::Serialize;

const DEFAULT_TERMINAL_WIDTH: usize = 80;
const MAX_CONTENT_WIDTH: usize = 100;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text.
    Text,
    /// JSON for programmatic use.
    Json,
}

/// Writes `value` as pretty JSON to stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value)?;
    writeln!(handle)?;
    Ok(())
}

/// Colors a status by what it means for the task.
pub fn status_label(status: TaskStatus) -> ColoredString {
    let text = status.as_str();
    match status {
        TaskStatus::Todo => text.normal(),
        TaskStatus::Split => text.cyan(),
        TaskStatus::Planned => text.blue(),
        TaskStatus::InProgress => text.yellow(),
        TaskStatus::Done => text.green(),
        TaskStatus::Failed => text.red(),
    }
}

/// `#3 [planned] Title` with the priority when set.
pub fn task_line(task: &Task) -> String {
    let mut line = format!(
        "{} [{}] {}",
        format!("#{}", task.id).cyan(),
        status_label(task.status),
        task.title
    );
    if task.priority != 0 {
        line.push_str(&format!(" {}", format!("(priority {})", task.priority).dimmed()));
    }
    line
}

/// Prints a bold title followed by `content` wrapped and indented.
pub fn print_section(title: &str, content: &str) {
    let content = content.trim();
    if content.is_empty() {
        return;
    }
    println!();
    println!("{}:", title.bold());
    for line in wrap_text(content, content_width().saturating_sub(2)) {
        println!("  {line}");
    }
}

fn content_width() -> usize {
    terminal_size::terminal_size()
        .map_or(DEFAULT_TERMINAL_WIDTH, |(w, _)| usize::from(w.0))
        .min(MAX_CONTENT_WIDTH)
}

/// Wraps each line to `max_width`, keeping existing line breaks.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    text.lines()
        .flat_map(|line| {
            if line.trim().is_empty() {
                vec![String::new()]
            } else {
                textwrap::wrap(line, max_width.max(20))
                    .into_iter()
                    .map(std::borrow::Cow::into_owned)
                    .collect()
            }
        })
        .collect()
}

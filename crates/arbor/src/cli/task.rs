//! `arbor task` command implementations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use arbor::{NewTask, PageRequest, ParentFilter, Relation, TaskFilter, TaskId, TaskStatus};
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;

use super::OutputMode;
use super::output::{print_json, print_section, status_label, task_line};

/// Task subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    /// Create a task
    Add {
        /// Task title
        title: String,

        /// Parent task id
        #[arg(short, long)]
        parent: Option<TaskId>,

        /// Priority (higher runs first among equals)
        #[arg(long, default_value = "0")]
        priority: i64,

        /// Requirement text
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Show a task with its documents
    Get {
        /// Task id (`5` or `#5`)
        id: TaskId,
    },

    /// List tasks
    List {
        /// Only tasks with this status
        #[arg(short, long)]
        status: Option<TaskStatus>,

        /// Only children of this task
        #[arg(short, long, conflicts_with = "roots")]
        parent: Option<TaskId>,

        /// Only tasks without a parent
        #[arg(long)]
        roots: bool,

        /// Only leaf tasks
        #[arg(long)]
        leaves: bool,

        /// Page number (1-based)
        #[arg(long, default_value = "1")]
        page: u32,

        /// Tasks per page
        #[arg(long, default_value_t = arbor::pagination::DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },

    /// Delete a task without children
    Delete {
        /// Task id
        id: TaskId,
    },

    /// Change a task's status
    Status {
        /// Task id
        id: TaskId,

        /// New status (todo, split, planned, in_progress, done, failed)
        status: TaskStatus,
    },

    /// Attach a plan and mark the task planned
    Plan {
        /// Task id
        id: TaskId,

        /// Plan text
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        text: Option<String>,

        /// Read the plan from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Run a task subcommand.
pub fn run(dir: &Path, command: TaskCommand, mode: OutputMode) -> Result<()> {
    let engine = super::open(dir)?;

    match command {
        TaskCommand::Add {
            title,
            parent,
            priority,
            body,
        } => {
            let mut new = NewTask::new(title).with_priority(priority);
            if let Some(parent) = parent {
                new = new.with_parent(parent);
            }
            if let Some(body) = body {
                new = new.with_body(body);
            }
            let task = engine.create_task(new)?;
            match mode {
                OutputMode::Json => print_json(&task),
                OutputMode::Text => {
                    println!("{} {}", "Created".green().bold(), task_line(&task));
                    Ok(())
                }
            }
        }

        TaskCommand::Get { id } => {
            let detail = engine.task_detail(id)?;
            let related = engine.related(id)?;
            if mode == OutputMode::Json {
                return print_json(&json!({ "detail": detail, "related": related }));
            }

            let task = &detail.task;
            println!("{}", task_line(task));
            println!(
                "  {} depth {}{}",
                "•".dimmed(),
                task.depth,
                if task.is_leaf { ", leaf" } else { "" }
            );
            if let Some(parent) = task.parent {
                println!("  {} parent #{parent}", "•".dimmed());
            }
            print_section("Requirement", &detail.body);
            print_section("Plan", detail.plan.as_deref().unwrap_or_default());
            print_section("Report", detail.report.as_deref().unwrap_or_default());
            print_section("Error", detail.error.as_deref().unwrap_or_default());

            if !related.is_empty() {
                println!();
                println!("{}:", "Related".bold());
                for r in &related {
                    let label = match r.relation {
                        Relation::Dependency => "depends on",
                        Relation::Dependent => "needed by",
                        Relation::Parent => "parent",
                        Relation::Child => "child",
                    };
                    println!("  {:<10} {}", label.dimmed(), task_line(&r.task));
                }
            }
            Ok(())
        }

        TaskCommand::List {
            status,
            parent,
            roots,
            leaves,
            page,
            page_size,
        } => {
            let filter = TaskFilter {
                status,
                parent: if roots {
                    Some(ParentFilter::Root)
                } else {
                    parent.map(ParentFilter::Child)
                },
                leaf_only: leaves,
            };
            let page = engine.list_tasks(&filter, PageRequest::new(page, page_size)?)?;
            if mode == OutputMode::Json {
                return print_json(&page);
            }

            if page.items.is_empty() {
                println!("{}", "No tasks found.".dimmed());
            }
            for task in &page.items {
                println!("{}", task_line(task));
            }
            println!(
                "{}",
                format!(
                    "page {}/{} ({} tasks)",
                    page.page, page.total_pages, page.total_items
                )
                .dimmed()
            );
            Ok(())
        }

        TaskCommand::Delete { id } => {
            let removal = engine.delete_task(id)?;
            match mode {
                OutputMode::Json => print_json(&json!({
                    "deleted": id,
                    "parent": removal.task.parent,
                    "parent_status": removal.parent_status,
                })),
                OutputMode::Text => {
                    println!("{} task #{id}", "Deleted".green().bold());
                    if let (Some(parent), Some(status)) =
                        (removal.task.parent, removal.parent_status)
                    {
                        println!("  parent #{parent} is now {}", status_label(status));
                    }
                    Ok(())
                }
            }
        }

        TaskCommand::Status { id, status } => {
            let task = engine.set_status(id, status)?;
            match mode {
                OutputMode::Json => print_json(&task),
                OutputMode::Text => {
                    println!("{}", task_line(&task));
                    Ok(())
                }
            }
        }

        TaskCommand::Plan { id, text, file } => {
            let plan = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("cannot read plan from '{}'", path.display()))?,
                (None, None) => bail!("give the plan text or --file"),
            };
            let task = engine.attach_plan(id, &plan)?;
            match mode {
                OutputMode::Json => print_json(&task),
                OutputMode::Text => {
                    println!("{} {}", "Planned".green().bold(), task_line(&task));
                    Ok(())
                }
            }
        }
    }
}

//! Arbor CLI - task dependency graph from the command line.
//!
//! Tasks live as Markdown documents under `.arbor/tasks/`; this binary
//! creates and queries them, keeps the derived store in sync and drives
//! planning and execution through the configured delegate.

use std::path::PathBuf;
use std::process::ExitCode;

use arbor::TraversalKind;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::OutputMode;
use cli::edge::EdgeCommand;
use cli::task::TaskCommand;

/// Arbor: task dependency graph with document reconciliation.
#[derive(Parser)]
#[command(name = "arbor")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Run as if started in this directory
    #[arg(short = 'C', long = "dir", global = true)]
    dir: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create `.arbor/` in the current directory
    Init,

    /// Create, inspect and change tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Manage dependency edges
    #[command(subcommand)]
    Edge(EdgeCommand),

    /// Bring the store in line with the task documents
    Sync,

    /// Recreate the store's task table from the documents
    Rebuild {
        /// Confirm that store-only state may be discarded
        #[arg(long)]
        yes: bool,
    },

    /// Show the next task ready to run
    Next,

    /// List all tasks with dependencies first
    Order,

    /// Detect dependency cycles in the store
    Cycles,

    /// Show task and edge counts
    Stats,

    /// Print the task tree with dependencies
    Map,

    /// Run every executable task
    Run {
        /// Tasks executed at once (overrides the configuration)
        #[arg(short, long)]
        parallel: Option<usize>,
    },

    /// Plan every pending task
    Plan {
        /// Tasks planned at once (overrides the configuration)
        #[arg(short, long)]
        parallel: Option<usize>,
    },

    /// Plan until nothing is left to plan, then run
    Cycle {
        /// Tasks handled at once (overrides the configuration)
        #[arg(short, long)]
        parallel: Option<usize>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let dir = match cli.dir {
        Some(d) => d,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!(
                    "{}: failed to get current directory: {e}",
                    "error".red().bold()
                );
                return ExitCode::FAILURE;
            }
        },
    };

    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let result = match cli.command {
        Commands::Init => cli::init::run(&dir, mode),
        Commands::Task(command) => cli::task::run(&dir, command, mode),
        Commands::Edge(command) => cli::edge::run(&dir, command, mode),
        Commands::Sync => cli::reconcile::sync(&dir, mode),
        Commands::Rebuild { yes } => cli::reconcile::rebuild(&dir, yes, mode),
        Commands::Next => cli::report::next(&dir, mode),
        Commands::Order => cli::report::order(&dir, mode),
        Commands::Cycles => cli::report::cycles(&dir, mode),
        Commands::Stats => cli::report::stats(&dir, mode),
        Commands::Map => cli::report::map(&dir, mode),
        Commands::Run { parallel } => cli::traverse::run(&dir, TraversalKind::Run, parallel, mode),
        Commands::Plan { parallel } => cli::traverse::run(&dir, TraversalKind::Plan, parallel, mode),
        Commands::Cycle { parallel } => {
            cli::traverse::run(&dir, TraversalKind::Cycle, parallel, mode)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            for cause in e.chain().skip(1) {
                eprintln!("  {}: {cause}", "caused by".dimmed());
            }
            ExitCode::FAILURE
        }
    }
}

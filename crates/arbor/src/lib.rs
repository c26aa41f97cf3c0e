//! # Arbor: task dependency graph with document reconciliation
//!
//! Arbor tracks a tree of tasks (parent/child decomposition) plus a separate
//! acyclic graph of dependencies between them, and drives the tasks through
//! planning and execution by an external delegate.
//!
//! Each task is a Markdown document under `.arbor/tasks/` (see [`arbor_doc`]).
//! The documents are authoritative; an `SQLite` store derived from them
//! answers ordering and readiness queries and is brought back in line by
//! [`Engine::sync`] (incremental) or [`Engine::rebuild`] (destructive).
//!
//! ## Quick Start
//!
//! ```no_run
//! use arbor::{Engine, NewTask};
//! use std::path::Path;
//!
//! let engine = Engine::discover(Path::new("."))?;
//!
//! let parser = engine.create_task(NewTask::new("Write the parser"))?;
//! let lexer = engine.create_task(NewTask::new("Write the lexer"))?;
//! engine.add_edge(parser.id, lexer.id)?;
//!
//! for task in engine.topological_order()? {
//!     println!("#{} {}", task.id, task.title);
//! }
//! # Ok::<(), arbor::Error>(())
//! ```
//!
//! ## Module Structure
//!
//! - [`engine`] - Project handle keeping documents and rows in step
//! - [`store`] - `SQLite` graph store
//! - [`graph`] - Cycle guard and scheduler
//! - [`state`] - Status transitions and derived fields
//! - [`reconcile`] - Sync and Rebuild
//! - [`vcs`] - Version control collaborator
//! - [`exec`] - Execution delegate and traversals
//! - [`config`] - Project layout and configuration file
//! - [`pagination`] - Page requests and pages

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exec;
pub mod graph;
pub mod pagination;
pub mod reconcile;
pub mod state;
pub mod store;
pub mod vcs;

pub use config::{ArborConfig, ProjectPaths};
pub use domain::{
    Edge, NewTask, ParentFilter, RelatedTask, Relation, Stats, Task, TaskDetail, TaskFilter,
    TaskId, TaskStatus,
};
pub use engine::{BatchGuard, Engine};
pub use error::{Error, ErrorKind, Result};
pub use exec::{CommandExecutor, Executor, Traversal, TraversalContext, TraversalKind};
pub use graph::{CycleGuard, DependencyGraph, GraphScheduler};
pub use pagination::{Page, PageRequest};
pub use reconcile::{Confirmation, RebuildSummary, SyncSummary};
pub use store::GraphStore;

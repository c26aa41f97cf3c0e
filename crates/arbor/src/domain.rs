//! Core domain types.
//!
//! A [`Task`] row holds only structural and status metadata; requirement,
//! plan, report and error text live in documents. Dependencies are [`Edge`]s,
//! kept separate from the parent/child hierarchy.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use arbor_doc::{Document, TaskId, TaskStatus};

/// Default limit on hierarchy depth (root is depth 0).
pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// Hard upper bound accepted for the configured maximum depth.
pub const MAX_DEPTH_LIMIT: u32 = 20;

/// A task as stored in the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    /// Unique id.
    pub id: TaskId,
    /// Parent in the hierarchy.
    pub parent: Option<TaskId>,
    /// Single-line title.
    pub title: String,
    /// Workflow status.
    pub status: TaskStatus,
    /// Scheduling priority.
    pub priority: i64,
    /// Distance from the root along the parent chain.
    pub depth: u32,
    /// `true` iff no task names this one as parent.
    pub is_leaf: bool,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When a stored field last changed.
    pub updated_at: DateTime<Utc>,
}

/// The document-backed fields of a task row.
///
/// This is what reconciliation compares between a document and a row;
/// derived fields and timestamps are not part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    /// Task id (from the document's file name).
    pub id: TaskId,
    /// Parent task.
    pub parent: Option<TaskId>,
    /// Title line.
    pub title: String,
    /// Declared status.
    pub status: TaskStatus,
    /// Declared priority.
    pub priority: i64,
}

impl TaskRecord {
    /// Builds the record a document describes.
    #[must_use]
    pub fn from_document(id: TaskId, document: &Document) -> Self {
        Self {
            id,
            parent: document.parent,
            title: document.title.clone(),
            status: document.status,
            priority: document.priority,
        }
    }

    /// Returns `true` if `task` already carries these fields.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.id == task.id
            && self.parent == task.parent
            && self.title == task.title
            && self.status == task.status
            && self.priority == task.priority
    }
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            parent: task.parent,
            title: task.title.clone(),
            status: task.status,
            priority: task.priority,
        }
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Title line (required, single line).
    pub title: String,
    /// Parent task.
    pub parent: Option<TaskId>,
    /// Priority.
    pub priority: i64,
    /// Requirement text.
    pub body: String,
}

impl NewTask {
    /// Starts a root task with the given title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Places the task under `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the requirement text.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// A dependency: `from` depends on `to`.
///
/// `to` must be `done` before `from` may run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    /// Dependent task.
    pub from: TaskId,
    /// Dependency task.
    pub to: TaskId,
    /// When the edge was added.
    pub created_at: DateTime<Utc>,
}

/// Parent constraint for task listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentFilter {
    /// Only tasks without a parent.
    Root,
    /// Only direct children of the given task.
    Child(TaskId),
}

/// Filter for task listings; all set constraints must hold.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Restrict to one status.
    pub status: Option<TaskStatus>,
    /// Restrict by parent.
    pub parent: Option<ParentFilter>,
    /// Restrict to leaves.
    pub leaf_only: bool,
}

/// How a related task is connected to the task in question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// The task depends on it.
    Dependency,
    /// It depends on the task.
    Dependent,
    /// The task's parent.
    Parent,
    /// A direct child.
    Child,
}

/// A task connected to another by an edge or by the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedTask {
    /// How it is connected.
    pub relation: Relation,
    /// The related task.
    pub task: Task,
}

/// A task row together with its documents.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    /// The stored row.
    pub task: Task,
    /// Requirement text from the primary document.
    pub body: String,
    /// Plan document, if any.
    pub plan: Option<String>,
    /// Report document, if any.
    pub report: Option<String>,
    /// Error document, if any.
    pub error: Option<String>,
}

/// Task counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// All tasks.
    pub total: usize,
    /// Leaf tasks.
    pub leaves: usize,
    /// Leaf tasks per status.
    pub leaves_by_status: BTreeMap<TaskStatus, usize>,
    /// Dependency edges.
    pub edges: usize,
}

impl Stats {
    /// Leaf count for one status.
    #[must_use]
    pub fn leaves_with(&self, status: TaskStatus) -> usize {
        self.leaves_by_status.get(&status).copied().unwrap_or(0)
    }
}

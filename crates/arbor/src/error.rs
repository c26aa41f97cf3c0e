//! Error types for arbor operations.
//!
//! Every failure carries a variant of [`Error`]; callers branch on
//! [`Error::kind`] rather than on message text.
//!
//! ## Propagation
//!
//! - Cycle checks and document validation run before any write, so a
//!   rejected mutation leaves no partial state.
//! - Problems with individual documents during Sync or Rebuild are collected
//!   as warnings in the summary, not returned as errors.
//! - A store failure inside Sync or Rebuild rolls back the whole operation.
//!
//! ## Categorization
//!
//! [`ErrorKind`] splits errors into input problems (the caller or the
//! documents can fix them) and internal problems (storage, I/O, subprocesses).

use std::fmt;
use std::path::PathBuf;

use arbor_doc::{TaskId, TaskStatus};
use thiserror::Error;

/// Result type for arbor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for arbor operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed validation (malformed document, bad field, bad argument).
    #[error("validation error: {0}")]
    Validation(String),

    /// A document could not be read, parsed or written.
    #[error("document error: {0}")]
    Document(#[from] arbor_doc::Error),

    /// Inserting the edge would close a dependency cycle.
    #[error("dependency cycle: {}", format_path(.path))]
    Cycle {
        /// The would-be cycle, starting and ending at the same task.
        path: Vec<TaskId>,
    },

    /// The referenced task does not exist.
    #[error("task #{0} not found")]
    TaskNotFound(TaskId),

    /// The referenced edge does not exist.
    #[error("edge #{from} -> #{to} not found")]
    EdgeNotFound {
        /// Dependent task.
        from: TaskId,
        /// Dependency task.
        to: TaskId,
    },

    /// The operation conflicts with existing state (duplicate edge,
    /// self-loop, task with children).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The status change is not allowed from the task's current status.
    #[error("task #{id}: cannot move from {from} to {to}")]
    InvalidTransition {
        /// Task being changed.
        id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// A store query or transaction failed.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Version control could not restore a document.
    #[error("cannot restore {}: {reason}", .path.display())]
    Recovery {
        /// Path that was being restored.
        path: PathBuf,
        /// What the version control tool reported.
        reason: String,
    },

    /// Version control failed to stage or commit documents.
    #[error("version control error: {0}")]
    VersionControl(String),

    /// A destructive operation was invoked without confirmation.
    #[error("{0} requires explicit confirmation")]
    ConfirmationRequired(&'static str),

    /// The execution delegate failed to run.
    #[error("execution error: {0}")]
    Execution(String),

    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal invariant broken (poisoned lock and the like).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Fieldless categorization of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Input problems ===
    /// Malformed input or document.
    Validation,
    /// Rejected edge that would close a cycle.
    Cycle,
    /// Missing task or edge.
    NotFound,
    /// Duplicate, self-loop, disallowed transition or similar clash.
    Conflict,
    /// Bad configuration.
    Config,

    // === Internal problems ===
    /// Store query or transaction failure.
    Store,
    /// Version control failure (restore or commit).
    Recovery,
    /// File system failure.
    Io,
    /// Execution delegate failure.
    Execution,
    /// Broken internal invariant.
    Internal,
}

impl ErrorKind {
    /// Returns `true` if the caller or the documents can fix the problem.
    #[must_use]
    pub fn is_input_error(self) -> bool {
        matches!(
            self,
            Self::Validation | Self::Cycle | Self::NotFound | Self::Conflict | Self::Config
        )
    }

    /// Returns `true` if the problem lies in arbor's infrastructure.
    #[must_use]
    pub fn is_internal_error(self) -> bool {
        !self.is_input_error()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Cycle => "cycle",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::Config => "config",
            Self::Store => "store",
            Self::Recovery => "recovery",
            Self::Io => "I/O",
            Self::Execution => "execution",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Categorizes the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::ConfirmationRequired(_) => ErrorKind::Validation,
            Self::Document(e) => match e {
                arbor_doc::Error::Io(_) => ErrorKind::Io,
                arbor_doc::Error::NotFound(_) => ErrorKind::NotFound,
                arbor_doc::Error::Invalid(_)
                | arbor_doc::Error::InvalidStatus(_)
                | arbor_doc::Error::InvalidId(_) => ErrorKind::Validation,
            },
            Self::Cycle { .. } => ErrorKind::Cycle,
            Self::TaskNotFound(_) | Self::EdgeNotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) | Self::InvalidTransition { .. } => ErrorKind::Conflict,
            Self::Store(_) => ErrorKind::Store,
            Self::Recovery { .. } | Self::VersionControl(_) => ErrorKind::Recovery,
            Self::Execution(_) => ErrorKind::Execution,
            Self::Io(_) => ErrorKind::Io,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The cycle path for [`Error::Cycle`].
    #[must_use]
    pub fn cycle_path(&self) -> Option<&[TaskId]> {
        match self {
            Self::Cycle { path } => Some(path),
            _ => None,
        }
    }
}

/// Renders `[1, 2, 1]` as `#1 -> #2 -> #1`.
pub(crate) fn format_path(path: &[TaskId]) -> String {
    path.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(" -> ")
}

//! Status transitions and derived structural fields.
//!
//! ```text
//! todo ──first child──▶ split ◀──first child── planned
//!  │                      │                      ▲  │
//!  └──────plan attached───┼──────────────────────┘  │ claimed
//!                         │                         ▼
//!      (revert-to-todo)   │                    in_progress
//!  todo ◀──last child─────┘                      │      │
//!                                              done   failed
//! ```
//!
//! `done` and `failed` are terminal. Leaf flags and depths are not part of a
//! transition; [`derived`] recomputes them after structural changes.

pub mod derived;

use crate::config::LastChildPolicy;
use crate::domain::{TaskId, TaskStatus};
use crate::error::{Error, Result};

/// Enforces the allowed status transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateMachine {
    policy: LastChildPolicy,
}

impl StateMachine {
    /// Creates a machine applying `policy` when a parent loses its last child.
    #[must_use]
    pub const fn new(policy: LastChildPolicy) -> Self {
        Self { policy }
    }

    /// The configured last-child policy.
    #[must_use]
    pub const fn policy(&self) -> LastChildPolicy {
        self.policy
    }

    /// Returns `true` if `from -> to` is a caller-requested transition.
    ///
    /// Staying in the same status is not a transition and returns `false`.
    /// `split -> todo` is excluded: it only happens through
    /// [`StateMachine::after_last_child_removed`].
    #[must_use]
    pub const fn allows(from: TaskStatus, to: TaskStatus) -> bool {
        use crate::domain::TaskStatus::{Done, Failed, InProgress, Planned, Split, Todo};
        matches!(
            (from, to),
            (Todo | Planned, Split)
                | (Todo, Planned)
                | (Planned, InProgress)
                | (InProgress, Done | Failed)
        )
    }

    /// Validates a requested status change for `id`.
    ///
    /// Returns `Ok(false)` when the task already has the status (no-op).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] for anything outside the table.
    pub fn check(&self, id: TaskId, from: TaskStatus, to: TaskStatus) -> Result<bool> {
        if from == to {
            return Ok(false);
        }
        if Self::allows(from, to) {
            return Ok(true);
        }
        Err(Error::InvalidTransition { id, from, to })
    }

    /// Status a parent moves to when it gains a child.
    ///
    /// Returns `None` if the parent is already `split`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the parent is in progress or
    /// finished; such tasks cannot be decomposed.
    pub fn after_child_added(
        &self,
        parent: TaskId,
        status: TaskStatus,
    ) -> Result<Option<TaskStatus>> {
        match status {
            TaskStatus::Split => Ok(None),
            TaskStatus::Todo | TaskStatus::Planned => Ok(Some(TaskStatus::Split)),
            from => Err(Error::InvalidTransition {
                id: parent,
                from,
                to: TaskStatus::Split,
            }),
        }
    }

    /// Status a parent moves to when its last child is removed.
    ///
    /// Only `split` parents under [`LastChildPolicy::RevertToTodo`] change.
    #[must_use]
    pub fn after_last_child_removed(&self, status: TaskStatus) -> Option<TaskStatus> {
        match (self.policy, status) {
            (LastChildPolicy::RevertToTodo, TaskStatus::Split) => Some(TaskStatus::Todo),
            _ => None,
        }
    }
}

//! Task identity and status.
//!
//! These are the only two domain types a document declares on its own: the
//! id comes from the file name and the status from the header.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Unique, positive task identifier.
///
/// Ids are assigned monotonically by the store and never reused while the
/// task exists. Displays as the bare number; messages conventionally prefix
/// it with `#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct TaskId(i64);

impl TaskId {
    /// Creates an id, returning `None` unless `raw` is positive.
    #[must_use]
    pub const fn new(raw: i64) -> Option<Self> {
        if raw > 0 { Some(Self(raw)) } else { None }
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Returns the id that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for TaskId {
    type Error = Error;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| Error::InvalidId(raw.to_string()))
    }
}

impl From<TaskId> for i64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl FromStr for TaskId {
    type Err = Error;

    /// Parses `5` or `#5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches('#');
        digits
            .parse::<i64>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| Error::InvalidId(s.to_string()))
    }
}

/// Workflow status of a task.
///
/// `todo` tasks await planning; planning either splits a task into children
/// (`split`) or attaches a plan (`planned`). Planned leaves are executed and
/// end `done` or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Newly created, awaiting planning.
    Todo,
    /// Decomposed into child tasks.
    Split,
    /// Plan attached; ready for execution.
    Planned,
    /// Claimed by an executor.
    InProgress,
    /// Finished successfully.
    Done,
    /// Execution failed.
    Failed,
}

impl TaskStatus {
    /// Every status, in workflow order.
    pub const ALL: [Self; 6] = [
        Self::Todo,
        Self::Split,
        Self::Planned,
        Self::InProgress,
        Self::Done,
        Self::Failed,
    ];

    /// The spelling used in documents and the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Split => "split",
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` for `done` and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns `true` for the status a dependency must reach before its
    /// dependents may run.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns `true` for the status the scheduler selects from.
    #[must_use]
    pub const fn is_ready_for_execution(self) -> bool {
        matches!(self, Self::Planned)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidStatus(s.to_string()))
    }
}

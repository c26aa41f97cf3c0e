//! Execution delegate and graph traversals.
//!
//! The delegate does the actual work of a task: planning it (deciding to
//! split or writing a plan) or running it (carrying out the plan). This
//! module defines the delegate interface, a subprocess implementation, and
//! the traversals that feed tasks to it in parallel.
//!
//! ## Module Structure
//!
//! - `command` - [`CommandExecutor`], the subprocess delegate
//! - `context` - [`TraversalContext`], progress and cancellation of one traversal
//! - `plan` - Parsing the delegate's planning reply
//! - `prompt` - Prompt text for both modes
//! - `traversal` - [`Traversal`]: plan, run and full cycles

mod command;
mod context;
mod plan;
mod prompt;
mod traversal;

pub use command::CommandExecutor;
pub use context::{TraversalContext, TraversalKind, TraversalStatus};
pub use plan::{ChildSpec, PlanReply, parse_plan_output};
pub use prompt::{plan_prompt, render_prompt, run_prompt};
pub use traversal::{Traversal, TraversalReport};

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{Relation, TaskId};
use crate::error::Result;

/// What the delegate is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Plan a `todo` task: split it or write a plan.
    Plan,
    /// Carry out a `planned` task.
    Run,
}

/// A task connected to the one being executed, with the text the delegate
/// should see (its requirement when planning, its plan when running).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedSummary {
    /// Related task id.
    pub id: TaskId,
    /// Its title.
    pub title: String,
    /// How it is connected.
    pub relation: Relation,
    /// Requirement or plan text.
    pub text: String,
}

/// Everything the delegate gets for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRequest {
    /// Task being executed.
    pub task_id: TaskId,
    /// Plan or run.
    pub mode: ExecutionMode,
    /// Task title.
    pub title: String,
    /// Requirement text from the task document.
    pub requirement: String,
    /// Plan text (run mode).
    pub plan: Option<String>,
    /// Related tasks.
    pub related: Vec<RelatedSummary>,
    /// The whole task tree as text.
    pub context_map: String,
    /// `true` when the task may not be split further.
    pub at_max_depth: bool,
}

/// What the delegate reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Whether the delegate considers the work successful.
    pub success: bool,
    /// Free-form output (plan reply, report or error text).
    pub output: String,
}

impl ExecutionOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Performs the work of a task.
///
/// Timeouts and retries are the implementation's business; the traversal
/// calls each task once.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executes one request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`](crate::Error::Execution) if the delegate
    /// could not be run at all. A delegate that ran and failed returns an
    /// unsuccessful [`ExecutionOutcome`] instead.
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome>;
}

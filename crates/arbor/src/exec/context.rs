//! Progress and cancellation state of one traversal.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::domain::TaskId;

/// Which traversal is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalKind {
    /// Planning `todo` leaves.
    Plan,
    /// Running executable tasks.
    Run,
    /// Planning rounds followed by a run.
    Cycle,
}

impl fmt::Display for TraversalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plan => "plan",
            Self::Run => "run",
            Self::Cycle => "cycle",
        })
    }
}

/// Shared state of a running traversal.
///
/// Clone the [`CancellationToken`] from [`TraversalContext::token`] to stop
/// the traversal from elsewhere (a signal handler, another task). Tasks
/// already handed to the delegate finish; no new ones start.
#[derive(Debug)]
pub struct TraversalContext {
    kind: TraversalKind,
    started_at: DateTime<Utc>,
    in_flight: Mutex<BTreeSet<TaskId>>,
    completed: AtomicUsize,
    failed: AtomicUsize,
    token: CancellationToken,
}

/// Point-in-time view of a traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraversalStatus {
    /// Traversal kind.
    pub kind: TraversalKind,
    /// When it started.
    pub started_at: DateTime<Utc>,
    /// Tasks currently with the delegate.
    pub in_flight: Vec<TaskId>,
    /// Number of delegate calls running.
    pub active_workers: usize,
    /// Tasks finished successfully so far.
    pub completed: usize,
    /// Tasks that failed so far.
    pub failed: usize,
    /// Whether cancellation was requested.
    pub cancelled: bool,
}

impl TraversalContext {
    /// Creates a context with a fresh token.
    #[must_use]
    pub fn new(kind: TraversalKind) -> Self {
        Self::with_token(kind, CancellationToken::new())
    }

    /// Creates a context that stops when `token` is cancelled.
    #[must_use]
    pub fn with_token(kind: TraversalKind, token: CancellationToken) -> Self {
        Self {
            kind,
            started_at: Utc::now(),
            in_flight: Mutex::new(BTreeSet::new()),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            token,
        }
    }

    /// Traversal kind.
    #[must_use]
    pub fn kind(&self) -> TraversalKind {
        self.kind
    }

    /// Start time.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn in_flight(&self) -> MutexGuard<'_, BTreeSet<TaskId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks `id` as handed to the delegate. Returns `false` if it already is.
    pub(crate) fn begin(&self, id: TaskId) -> bool {
        self.in_flight().insert(id)
    }

    /// Whether `id` is with the delegate.
    pub(crate) fn is_in_flight(&self, id: TaskId) -> bool {
        self.in_flight().contains(&id)
    }

    /// Marks `id` as finished and counts the result.
    pub(crate) fn finish(&self, id: TaskId, success: bool) {
        self.in_flight().remove(&id);
        let counter = if success { &self.completed } else { &self.failed };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Snapshot of the current progress.
    #[must_use]
    pub fn status(&self) -> TraversalStatus {
        let in_flight: Vec<TaskId> = self.in_flight().iter().copied().collect();
        TraversalStatus {
            kind: self.kind,
            started_at: self.started_at,
            active_workers: in_flight.len(),
            in_flight,
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            cancelled: self.is_cancelled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: i64) -> TaskId {
        TaskId::new(raw).unwrap()
    }

    #[test]
    fn tracks_in_flight_and_counts() {
        let ctx = TraversalContext::new(TraversalKind::Run);
        assert!(ctx.begin(id(2)));
        assert!(ctx.begin(id(1)));
        assert!(!ctx.begin(id(2)));

        let status = ctx.status();
        assert_eq!(status.in_flight, vec![id(1), id(2)]);
        assert_eq!(status.active_workers, 2);

        ctx.finish(id(1), true);
        ctx.finish(id(2), false);
        let status = ctx.status();
        assert!(status.in_flight.is_empty());
        assert_eq!((status.completed, status.failed), (1, 1));
    }

    #[test]
    fn shared_token_cancels() {
        let token = CancellationToken::new();
        let ctx = TraversalContext::with_token(TraversalKind::Cycle, token.clone());
        assert!(!ctx.status().cancelled);

        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.status().cancelled);
    }
}

//! Reconciliation between task documents and the graph store.
//!
//! Documents are authoritative. [`ReconciliationEngine::sync`] brings the
//! store in line with them incrementally; [`ReconciliationEngine::rebuild`]
//! throws the task table away and recreates it from the documents.
//!
//! Both run as one store transaction. Problems with single documents become
//! warnings in the summary; a store failure rolls everything back.

mod rebuild;
mod scan;
mod sync;

use std::fmt;

use arbor_doc::DocumentStore;
use serde::Serialize;
use tracing::warn;

use crate::domain::TaskId;
use crate::store::GraphStore;
use crate::vcs::VersionControl;

/// Caller's answer to "discard store-only state and rebuild?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Go ahead.
    Confirmed,
    /// Do not run.
    Unconfirmed,
}

impl From<bool> for Confirmation {
    fn from(confirmed: bool) -> Self {
        if confirmed {
            Self::Confirmed
        } else {
            Self::Unconfirmed
        }
    }
}

/// Outcome of a Sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Rows created from documents.
    pub inserted: usize,
    /// Rows overwritten from documents.
    pub updated: usize,
    /// Rows removed because their document was gone for good.
    pub deleted: usize,
    /// Documents recovered from version control.
    pub restored: usize,
    /// Documents skipped as invalid or orphaned.
    pub skipped: usize,
    /// One line per problem, prefixed with the task id.
    pub warnings: Vec<String>,
}

impl SyncSummary {
    /// Rows written (inserted, updated or deleted).
    #[must_use]
    pub fn changes(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }

    /// Returns `true` if documents and store already agreed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.changes() == 0 && self.restored == 0
    }

    fn warn(&mut self, id: TaskId, message: impl fmt::Display) {
        warn!(task_id = %id, "{message}");
        self.warnings.push(format!("#{id}: {message}"));
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inserted {}, updated {}, deleted {}, restored {}, skipped {}",
            self.inserted, self.updated, self.deleted, self.restored, self.skipped
        )
    }
}

/// Outcome of a Rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    /// Rows created, one per valid document.
    pub rebuilt: usize,
    /// Documents skipped as invalid or orphaned.
    pub skipped: usize,
    /// Edges dropped because an endpoint has no row anymore.
    pub purged_edges: usize,
    /// One line per skipped or suspicious document.
    pub warnings: Vec<String>,
}

impl fmt::Display for RebuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rebuilt {} tasks, skipped {}, dropped {} edges",
            self.rebuilt, self.skipped, self.purged_edges
        )
    }
}

/// Runs Sync and Rebuild over one project's documents and store.
///
/// Callers must not run two reconciliations of the same project at once.
#[derive(Debug, Clone, Copy)]
pub struct ReconciliationEngine<'a> {
    docs: &'a DocumentStore,
    store: &'a GraphStore,
    vcs: &'a dyn VersionControl,
    max_depth: u32,
    commit: bool,
}

impl<'a> ReconciliationEngine<'a> {
    /// Creates an engine; `max_depth` bounds the depth post-pass.
    #[must_use]
    pub fn new(
        docs: &'a DocumentStore,
        store: &'a GraphStore,
        vcs: &'a dyn VersionControl,
        max_depth: u32,
    ) -> Self {
        Self {
            docs,
            store,
            vcs,
            max_depth,
            commit: true,
        }
    }

    /// Turns the closing commit of the document directory on or off.
    #[must_use]
    pub fn with_commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    /// Commits the document directory; failures are logged, not returned.
    fn commit_documents(&self, message: &str) {
        if !self.commit {
            return;
        }
        if let Err(e) = self.vcs.commit(&[self.docs.dir().to_path_buf()], message) {
            warn!(error = %e, message, "could not commit documents");
        }
    }
}

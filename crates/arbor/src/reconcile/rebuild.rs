//! Destructive Rebuild.

use rusqlite::{Connection, TransactionBehavior};
use tracing::{info, warn};

use super::scan::{DocumentSet, scan_documents};
use super::{Confirmation, RebuildSummary, ReconciliationEngine};
use crate::error::{Error, Result};
use crate::state::derived::recompute;
use crate::store::{TASKS_TABLE, insert_row, now_text, purge_dangling_edges, reset_sequence};

/// Drops and refills the task table. Foreign keys must already be off.
///
/// Returns the number of edges purged.
fn replace_tasks(conn: &mut Connection, documents: &DocumentSet, max_depth: u32) -> Result<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute_batch("DROP TABLE IF EXISTS tasks")?;
    tx.execute_batch(TASKS_TABLE)?;

    let now = now_text();
    for record in documents.records.values() {
        insert_row(&tx, record, &now)?;
    }
    recompute(&tx, max_depth)?;
    let purged = purge_dangling_edges(&tx)?;
    reset_sequence(&tx)?;

    tx.commit()?;
    Ok(purged)
}

impl ReconciliationEngine<'_> {
    /// Recreates the task table from the documents.
    ///
    /// Store-only state (rows without a valid document) is discarded, which
    /// is why the caller must confirm. Edges survive when both endpoints are
    /// rebuilt. The id sequence is reset to the highest rebuilt id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfirmationRequired`] without confirmation, or an
    /// error if the documents cannot be listed or the store transaction
    /// fails; the store is then unchanged.
    pub fn rebuild(&self, confirmation: Confirmation) -> Result<RebuildSummary> {
        if confirmation != Confirmation::Confirmed {
            return Err(Error::ConfirmationRequired("rebuild"));
        }

        let documents = scan_documents(self.docs)?;

        let mut conn = self.store.connection()?;
        // Dropping the table with foreign keys on would cascade into edges,
        // and the pragma is ignored inside a transaction.
        conn.pragma_update(None, "foreign_keys", "OFF")?;
        let replaced = replace_tasks(&mut conn, &documents, self.max_depth);
        let reenabled = conn.pragma_update(None, "foreign_keys", "ON");
        drop(conn);

        let purged_edges = replaced?;
        reenabled?;

        if purged_edges > 0 {
            warn!(purged_edges, "dropped edges to tasks without documents");
        }

        let summary = RebuildSummary {
            rebuilt: documents.records.len(),
            skipped: documents.skipped,
            purged_edges,
            warnings: documents.warnings,
        };
        info!(
            rebuilt = summary.rebuilt,
            skipped = summary.skipped,
            purged_edges,
            "rebuild complete"
        );

        self.commit_documents(&format!("rebuild: {} tasks from files", summary.rebuilt));
        Ok(summary)
    }
}

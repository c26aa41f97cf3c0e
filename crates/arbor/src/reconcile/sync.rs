//! Incremental Sync.

use std::collections::HashMap;

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use super::scan::scan_documents;
use super::{ReconciliationEngine, SyncSummary};
use crate::domain::{Task, TaskId};
use crate::error::Result;
use crate::state::derived::recompute;
use crate::store::{delete_row, id_at, insert_row, load_all_tasks, now_text, update_row};
use crate::vcs::RestoreOutcome;

/// Clears parent references that point at rows which no longer exist.
///
/// Returns `(child, former parent)` pairs.
fn detach_dangling_parents(conn: &Connection) -> rusqlite::Result<Vec<(TaskId, TaskId)>> {
    let mut stmt = conn.prepare(
        "SELECT id, parent_id FROM tasks
         WHERE parent_id IS NOT NULL AND parent_id NOT IN (SELECT id FROM tasks)
         ORDER BY id",
    )?;
    let dangling = stmt
        .query_map([], |row| Ok((id_at(row, 0)?, id_at(row, 1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if !dangling.is_empty() {
        conn.execute(
            "UPDATE tasks SET parent_id = NULL
             WHERE parent_id IS NOT NULL AND parent_id NOT IN (SELECT id FROM tasks)",
            [],
        )?;
    }
    Ok(dangling)
}

impl ReconciliationEngine<'_> {
    /// Reconciles the store with the documents without discarding anything
    /// a document still backs.
    ///
    /// 1. Rows whose document is gone are restored from version control
    ///    first, so the restored document takes part in this pass.
    /// 2. Valid documents insert missing rows and overwrite diverged ones.
    /// 3. Rows whose document could not be restored are deleted.
    /// 4. Leaf flags and depths are recomputed.
    ///
    /// Steps 2 to 4 run in one transaction. The document directory is
    /// committed afterwards when rows changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the documents cannot be listed or the store
    /// transaction fails; the store is then unchanged.
    pub fn sync(&self) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        let mut missing = Vec::new();
        for task in self.store.all_tasks()? {
            if self.docs.exists(task.id) {
                continue;
            }
            match self.vcs.restore(&self.docs.path(task.id)) {
                Ok(RestoreOutcome::Restored) if self.docs.exists(task.id) => {
                    summary.restored += 1;
                }
                Ok(_) => missing.push(task.id),
                Err(e) => {
                    debug!(task_id = %task.id, error = %e, "restore failed");
                    missing.push(task.id);
                }
            }
        }

        let documents = scan_documents(self.docs)?;
        summary.skipped = documents.skipped;
        summary.warnings = documents.warnings;

        let mut conn = self.store.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows: HashMap<TaskId, Task> = load_all_tasks(&tx)?
            .into_iter()
            .map(|task| (task.id, task))
            .collect();
        let now = now_text();

        for record in documents.records.values() {
            match rows.get(&record.id) {
                None => {
                    insert_row(&tx, record, &now)?;
                    summary.inserted += 1;
                    debug!(task_id = %record.id, "inserted row from document");
                }
                Some(row) if !record.matches(row) => {
                    update_row(&tx, record, &now)?;
                    summary.updated += 1;
                    debug!(task_id = %record.id, "updated row from document");
                }
                Some(_) => {}
            }
        }

        for id in missing {
            if delete_row(&tx, id)? {
                summary.deleted += 1;
                summary.warn(id, "document missing, row removed");
            }
        }

        for (id, parent) in detach_dangling_parents(&tx)? {
            summary.warn(id, format_args!("parent #{parent} no longer exists, detached"));
        }

        recompute(&tx, self.max_depth)?;
        tx.commit()?;
        drop(conn);

        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            restored = summary.restored,
            skipped = summary.skipped,
            "sync complete"
        );

        if summary.changes() > 0 {
            self.commit_documents(&format!(
                "sync: +{} ~{} -{}",
                summary.inserted, summary.updated, summary.deleted
            ));
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DEFAULT_MAX_DEPTH, TaskRecord, TaskStatus};
    use crate::state::StateMachine;
    use crate::store::GraphStore;
    use crate::vcs::NoVcs;
    use arbor_doc::{Document, DocumentStore};
    use tempfile::TempDir;

    fn id(raw: i64) -> TaskId {
        TaskId::new(raw).unwrap()
    }

    fn setup() -> (TempDir, DocumentStore, GraphStore) {
        let dir = tempfile::tempdir().expect("should create temp directory");
        let docs = DocumentStore::open(dir.path().join("tasks")).expect("open documents");
        let store = GraphStore::open_in_memory().expect("open store");
        (dir, docs, store)
    }

    fn write(docs: &DocumentStore, raw: i64, parent: Option<i64>, status: TaskStatus) {
        let document = Document::new(&format!("Task {raw}"), status)
            .with_parent(parent.map(id))
            .with_body("Body.");
        docs.write(id(raw), &document).unwrap();
    }

    fn sync(docs: &DocumentStore, store: &GraphStore) -> SyncSummary {
        ReconciliationEngine::new(docs, store, &NoVcs, DEFAULT_MAX_DEPTH)
            .sync()
            .unwrap()
    }

    #[test]
    fn inserts_rows_for_new_documents() {
        let (_dir, docs, store) = setup();
        write(&docs, 1, None, TaskStatus::Split);
        write(&docs, 2, Some(1), TaskStatus::Planned);

        let summary = sync(&docs, &store);
        assert_eq!(summary.inserted, 2);
        assert!(summary.warnings.is_empty());

        let parent = store.require_task(id(1)).unwrap();
        let child = store.require_task(id(2)).unwrap();
        assert!(!parent.is_leaf);
        assert_eq!(child.depth, 1);
        assert_eq!(child.status, TaskStatus::Planned);
    }

    #[test]
    fn second_sync_is_clean() {
        let (_dir, docs, store) = setup();
        write(&docs, 1, None, TaskStatus::Todo);
        sync(&docs, &store);

        assert!(sync(&docs, &store).is_clean());
    }

    #[test]
    fn diverged_row_is_overwritten() {
        let (_dir, docs, store) = setup();
        write(&docs, 1, None, TaskStatus::Todo);
        sync(&docs, &store);

        write(&docs, 1, None, TaskStatus::Done);
        let summary = sync(&docs, &store);

        assert_eq!(summary.updated, 1);
        assert_eq!(store.require_task(id(1)).unwrap().status, TaskStatus::Done);
    }

    #[test]
    fn row_without_document_is_removed_without_vcs() {
        let (_dir, docs, store) = setup();
        write(&docs, 1, None, TaskStatus::Todo);
        write(&docs, 5, None, TaskStatus::Todo);
        sync(&docs, &store);

        std::fs::remove_file(docs.path(id(5))).unwrap();
        let summary = sync(&docs, &store);

        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.warnings, vec!["#5: document missing, row removed".to_string()]);
        assert!(store.get_task(id(5)).unwrap().is_none());
    }

    #[test]
    fn children_of_removed_row_are_detached() {
        let (_dir, docs, store) = setup();
        let record = |raw, parent: Option<i64>| TaskRecord {
            id: id(raw),
            parent: parent.map(id),
            title: format!("Task {raw}"),
            status: TaskStatus::Todo,
            priority: 0,
        };
        store
            .insert_task(&record(1, None), &StateMachine::default(), DEFAULT_MAX_DEPTH)
            .unwrap();
        store
            .insert_task(&record(2, Some(1)), &StateMachine::default(), DEFAULT_MAX_DEPTH)
            .unwrap();
        std::fs::write(docs.path(id(2)), "not a document").unwrap();

        let summary = sync(&docs, &store);

        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.skipped, 1);
        let child = store.require_task(id(2)).unwrap();
        assert_eq!(child.parent, None);
        assert_eq!(child.depth, 0);
        assert!(summary.warnings.iter().any(|w| w.contains("parent #1 no longer exists")));
    }

    #[test]
    fn invalid_document_leaves_row_alone() {
        let (_dir, docs, store) = setup();
        write(&docs, 1, None, TaskStatus::Planned);
        sync(&docs, &store);

        std::fs::write(docs.path(id(1)), "---\nstatus: planned\n---\n").unwrap();
        let summary = sync(&docs, &store);

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.changes(), 0);
        assert_eq!(store.require_task(id(1)).unwrap().title, "Task 1");
    }

    fn sequence(store: &GraphStore) -> Option<i64> {
        store
            .connection()
            .unwrap()
            .query_row("SELECT seq FROM sqlite_sequence WHERE name = 'tasks'", [], |row| {
                row.get(0)
            })
            .ok()
    }

    #[test]
    fn store_failure_rolls_back_the_whole_pass() {
        let (_dir, docs, store) = setup();
        write(&docs, 1, None, TaskStatus::Todo);
        write(&docs, 2, None, TaskStatus::Todo);
        sync(&docs, &store);
        store.add_edge(id(2), id(1)).unwrap();

        let rows = store.all_tasks().unwrap();
        let edges = store.all_edges().unwrap();
        let seq = sequence(&store);

        // #1 diverges and would be updated before #3 fails to insert.
        write(&docs, 1, None, TaskStatus::Planned);
        write(&docs, 3, None, TaskStatus::Todo);
        store
            .connection()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER refuse_three BEFORE INSERT ON tasks WHEN NEW.id = 3
                 BEGIN SELECT RAISE(ABORT, 'refused'); END",
            )
            .unwrap();

        let result = ReconciliationEngine::new(&docs, &store, &NoVcs, DEFAULT_MAX_DEPTH).sync();

        assert!(result.is_err());
        assert_eq!(store.all_tasks().unwrap(), rows);
        assert_eq!(store.all_edges().unwrap(), edges);
        assert_eq!(sequence(&store), seq);
    }
}

//! `SQLite` graph store.
//!
//! The store is a derived index over task documents: it holds each task's
//! structural and status fields plus the dependency edges, and answers the
//! queries documents cannot (ordering, readiness, listings).
//!
//! ## Module Structure
//!
//! - `schema` - Table DDL
//! - `helpers` - Row conversion and column lists
//! - `tasks` - Task CRUD and transitions
//! - `edges` - Edge CRUD behind the cycle check

mod edges;
mod helpers;
mod schema;
mod tasks;

pub(crate) use edges::{load_all_edges, purge_dangling_edges};
pub(crate) use helpers::{id_at, now_text, optional_id_at};
pub(crate) use schema::{EDGES_TABLE, TASKS_TABLE};
pub(crate) use tasks::{
    delete_row, insert_row, load_all_tasks, load_task, reset_sequence, update_row,
};
pub use tasks::{Insertion, Removal};

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::domain::{Edge, Task};
use crate::error::{Error, Result};

/// `SQLite` database holding tasks and dependency edges.
///
/// The connection sits behind a `Mutex` so the store can be shared between
/// traversal workers; every operation takes the lock for its whole duration,
/// which also serializes check-then-write sequences within this process.
/// Other processes are serialized by `SQLite`'s own locking with a busy
/// timeout.
pub struct GraphStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl GraphStore {
    /// Opens or creates the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened and migrated.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::configure(&conn, busy_timeout)?;

        debug!(path = %path.display(), "opened store");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn, Duration::ZERO)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    fn configure(conn: &Connection, busy_timeout: Duration) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(TASKS_TABLE)?;
        conn.execute_batch(EDGES_TABLE)?;
        Ok(())
    }

    /// Database file, or `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquires the connection lock.
    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            Error::Internal(format!(
                "store connection mutex poisoned (a thread panicked while holding the lock): {e}"
            ))
        })
    }

    /// Reads every task and edge under one lock.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn snapshot(&self) -> Result<(Vec<Task>, Vec<Edge>)> {
        let conn = self.connection()?;
        let tasks = load_all_tasks(&conn)?;
        let edges = load_all_edges(&conn)?;
        Ok((tasks, edges))
    }
}

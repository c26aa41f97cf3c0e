//! Dependency edge operations.
//!
//! Every insertion runs the [`CycleGuard`] against the database inside the
//! same `IMMEDIATE` transaction as the insert, so no other writer can slip an
//! edge in between the check and the write.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info};

use super::GraphStore;
use super::helpers::{EDGE_COLUMNS, now_text, row_to_edge};
use super::tasks::load_task;
use crate::domain::{Edge, TaskId};
use crate::error::{Error, Result};
use crate::graph::{CycleGuard, EdgeSource};
use crate::pagination::{Page, PageRequest};

impl EdgeSource for Connection {
    fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskId>> {
        let mut stmt =
            self.prepare_cached("SELECT to_id FROM task_edges WHERE from_id = ?1 ORDER BY to_id")?;
        let ids = stmt
            .query_map([id.get()], |row| super::id_at(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn has_edge(&self, from: TaskId, to: TaskId) -> Result<bool> {
        let found: Option<i64> = self
            .query_row(
                "SELECT 1 FROM task_edges WHERE from_id = ?1 AND to_id = ?2",
                params![from.get(), to.get()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

pub(crate) fn load_all_edges(conn: &Connection) -> rusqlite::Result<Vec<Edge>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EDGE_COLUMNS} FROM task_edges ORDER BY from_id, to_id"
    ))?;
    stmt.query_map([], row_to_edge)?
        .collect::<std::result::Result<Vec<_>, _>>()
}

fn load_edge(conn: &Connection, from: TaskId, to: TaskId) -> rusqlite::Result<Option<Edge>> {
    conn.query_row(
        &format!("SELECT {EDGE_COLUMNS} FROM task_edges WHERE from_id = ?1 AND to_id = ?2"),
        params![from.get(), to.get()],
        row_to_edge,
    )
    .optional()
}

/// Deletes edges whose endpoints no longer exist.
///
/// Needed after Rebuild, which recreates the task table with foreign keys
/// off. Returns the number of edges removed.
pub(crate) fn purge_dangling_edges(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM task_edges
         WHERE from_id NOT IN (SELECT id FROM tasks) OR to_id NOT IN (SELECT id FROM tasks)",
        [],
    )
}

impl GraphStore {
    /// Adds the dependency `from -> to` (`from` depends on `to`).
    ///
    /// # Errors
    ///
    /// - [`Error::Conflict`] for a self-loop or an existing edge
    /// - [`Error::TaskNotFound`] if either task is missing
    /// - [`Error::Cycle`] if the edge would close a cycle
    ///
    /// On any error the edge set is unchanged.
    pub fn add_edge(&self, from: TaskId, to: TaskId) -> Result<Edge> {
        if from == to {
            return Err(Error::Conflict(format!("task #{from} cannot depend on itself")));
        }

        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for id in [from, to] {
            if load_task(&tx, id)?.is_none() {
                return Err(Error::TaskNotFound(id));
            }
        }
        CycleGuard::new(&*tx).check(from, to)?;

        tx.execute(
            "INSERT INTO task_edges (from_id, to_id, created_at) VALUES (?1, ?2, ?3)",
            params![from.get(), to.get(), now_text()],
        )?;
        let edge = load_edge(&tx, from, to)?.ok_or(Error::EdgeNotFound { from, to })?;
        tx.commit()?;

        info!(from = %from, to = %to, "added dependency");
        Ok(edge)
    }

    /// The cycle `from -> to` would close, without writing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if edges cannot be read.
    pub fn would_create_cycle(&self, from: TaskId, to: TaskId) -> Result<Option<Vec<TaskId>>> {
        let conn = self.connection()?;
        CycleGuard::new(&*conn).would_create_cycle(from, to)
    }

    /// Gets one edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_edge(&self, from: TaskId, to: TaskId) -> Result<Option<Edge>> {
        let conn = self.connection()?;
        load_edge(&conn, from, to).map_err(Into::into)
    }

    /// All edges ordered by `(from, to)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_edges(&self) -> Result<Vec<Edge>> {
        let conn = self.connection()?;
        load_all_edges(&conn).map_err(Into::into)
    }

    /// One page of edges ordered by `(from, to)`.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn list_edges(&self, page: PageRequest) -> Result<Page<Edge>> {
        let conn = self.connection()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM task_edges", [], |row| row.get(0))?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM task_edges ORDER BY from_id, to_id LIMIT ?1 OFFSET ?2"
        ))?;
        let items = stmt
            .query_map(
                params![
                    i64::try_from(page.limit()).unwrap_or(i64::MAX),
                    i64::try_from(page.offset()).unwrap_or(i64::MAX),
                ],
                row_to_edge,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Page::new(items, page, u64::try_from(total).unwrap_or(0)))
    }

    /// Tasks `id` depends on, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskId>> {
        let conn = self.connection()?;
        EdgeSource::dependencies_of(&*conn, id)
    }

    /// Tasks depending on `id`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dependents_of(&self, id: TaskId) -> Result<Vec<TaskId>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT from_id FROM task_edges WHERE to_id = ?1 ORDER BY from_id")?;
        let ids = stmt
            .query_map([id.get()], |row| super::id_at(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Removes the edge `from -> to`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EdgeNotFound`] if there is no such edge.
    pub fn delete_edge(&self, from: TaskId, to: TaskId) -> Result<()> {
        let conn = self.connection()?;
        let removed = conn.execute(
            "DELETE FROM task_edges WHERE from_id = ?1 AND to_id = ?2",
            params![from.get(), to.get()],
        )?;
        if removed == 0 {
            return Err(Error::EdgeNotFound { from, to });
        }
        debug!(from = %from, to = %to, "deleted dependency");
        Ok(())
    }
}

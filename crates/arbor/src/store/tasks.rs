//! Task CRUD operations for the graph store.
//!
//! Free functions take a plain `&Connection` so reconciliation can run them
//! inside its own transaction; the `GraphStore` methods wrap them with
//! locking and a transaction of their own.

use std::collections::BTreeMap;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};
use tracing::{debug, info};

use super::GraphStore;
use super::helpers::{TASK_COLUMNS, now_text, parse_status, row_to_task};
use crate::domain::{
    ParentFilter, RelatedTask, Relation, Stats, Task, TaskFilter, TaskId, TaskRecord, TaskStatus,
};
use crate::error::{Error, Result};
use crate::pagination::{Page, PageRequest};
use crate::state::StateMachine;
use crate::state::derived::recompute;

/// Inserts a row from document fields. Derived fields start as a leaf at
/// depth 0; callers recompute them afterwards.
pub(crate) fn insert_row(conn: &Connection, record: &TaskRecord, now: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO tasks (id, parent_id, title, status, priority, is_leaf, depth, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, ?6, ?6)",
        params![
            record.id.get(),
            record.parent.map(TaskId::get),
            record.title,
            record.status.as_str(),
            record.priority,
            now,
        ],
    )?;
    Ok(())
}

/// Overwrites the document-backed fields of a row.
///
/// Returns `false` if no row has the record's id.
pub(crate) fn update_row(conn: &Connection, record: &TaskRecord, now: &str) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE tasks SET parent_id = ?2, title = ?3, status = ?4, priority = ?5, updated_at = ?6
         WHERE id = ?1",
        params![
            record.id.get(),
            record.parent.map(TaskId::get),
            record.title,
            record.status.as_str(),
            record.priority,
            now,
        ],
    )?;
    Ok(changed > 0)
}

/// Deletes a row; edges go with it through the cascade.
pub(crate) fn delete_row(conn: &Connection, id: TaskId) -> rusqlite::Result<bool> {
    let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", [id.get()])?;
    Ok(changed > 0)
}

pub(crate) fn load_task(conn: &Connection, id: TaskId) -> rusqlite::Result<Option<Task>> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
        [id.get()],
        row_to_task,
    )
    .optional()
}

pub(crate) fn load_all_tasks(conn: &Connection) -> rusqlite::Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id"))?;
    stmt.query_map([], row_to_task)?
        .collect::<std::result::Result<Vec<_>, _>>()
}

fn load_children(conn: &Connection, id: TaskId) -> rusqlite::Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE parent_id = ?1 ORDER BY id"
    ))?;
    stmt.query_map([id.get()], row_to_task)?
        .collect::<std::result::Result<Vec<_>, _>>()
}

fn set_status_row(conn: &Connection, id: TaskId, status: TaskStatus, now: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE tasks SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.get(), status.as_str(), now],
    )?;
    Ok(())
}

/// Points the id sequence at the highest id in the table.
pub(crate) fn reset_sequence(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM sqlite_sequence WHERE name = 'tasks'", [])?;
    conn.execute(
        "INSERT INTO sqlite_sequence (name, seq) SELECT 'tasks', COALESCE(MAX(id), 0) FROM tasks",
        [],
    )?;
    Ok(())
}

/// Builds the WHERE clause and bound values for a filter.
fn filter_clause(filter: &TaskFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(status) = filter.status {
        values.push(Value::Text(status.as_str().to_string()));
        clauses.push(format!("status = ?{}", values.len()));
    }
    match filter.parent {
        Some(ParentFilter::Root) => clauses.push("parent_id IS NULL".to_string()),
        Some(ParentFilter::Child(parent)) => {
            values.push(Value::Integer(parent.get()));
            clauses.push(format!("parent_id = ?{}", values.len()));
        }
        None => {}
    }
    if filter.leaf_only {
        clauses.push("is_leaf = 1".to_string());
    }

    let clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (clause, values)
}

/// Result of inserting a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    /// The inserted row.
    pub task: Task,
    /// Status the parent had before this insert split it. `None` when the
    /// parent was already split or there is no parent.
    pub parent_split_from: Option<TaskStatus>,
}

/// Result of deleting a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// The deleted row.
    pub task: Task,
    /// New status of the former parent, when the last-child policy changed it.
    pub parent_status: Option<TaskStatus>,
}

impl GraphStore {
    /// Gets a task by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let conn = self.connection()?;
        load_task(&conn, id).map_err(Into::into)
    }

    /// Gets a task by id, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] if there is no such task.
    pub fn require_task(&self, id: TaskId) -> Result<Task> {
        self.get_task(id)?.ok_or(Error::TaskNotFound(id))
    }

    /// All tasks ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.connection()?;
        load_all_tasks(&conn).map_err(Into::into)
    }

    /// Direct children of `id`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn children(&self, id: TaskId) -> Result<Vec<Task>> {
        let conn = self.connection()?;
        load_children(&conn, id).map_err(Into::into)
    }

    /// Counts tasks matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_tasks(&self, filter: &TaskFilter) -> Result<u64> {
        let conn = self.connection()?;
        let (clause, values) = filter_clause(filter);
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM tasks{clause}"),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// One page of tasks matching `filter`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn list_tasks(&self, filter: &TaskFilter, page: PageRequest) -> Result<Page<Task>> {
        let total = self.count_tasks(filter)?;

        let conn = self.connection()?;
        let (clause, mut values) = filter_clause(filter);
        let limit_index = values.len() + 1;
        values.push(Value::Integer(i64::try_from(page.limit()).unwrap_or(i64::MAX)));
        values.push(Value::Integer(i64::try_from(page.offset()).unwrap_or(i64::MAX)));

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks{clause} ORDER BY id LIMIT ?{limit_index} OFFSET ?{}",
            limit_index + 1
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_from_iter(values), row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Page::new(items, page, total))
    }

    /// The id a new task should get.
    ///
    /// One past the largest of: the id sequence, the largest row id, and
    /// `floor` (the largest id that has a document, which may not be synced
    /// yet).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn next_task_id(&self, floor: Option<TaskId>) -> Result<TaskId> {
        let conn = self.connection()?;
        let seq: Option<i64> = conn
            .query_row(
                "SELECT seq FROM sqlite_sequence WHERE name = 'tasks'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let max_row: Option<i64> = conn.query_row("SELECT MAX(id) FROM tasks", [], |row| row.get(0))?;

        let highest = [seq, max_row, floor.map(TaskId::get)]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(0);
        TaskId::new(highest + 1)
            .ok_or_else(|| Error::Internal(format!("id sequence is corrupt (at {highest})")))
    }

    /// Inserts a task and recomputes derived fields.
    ///
    /// When the record has a parent, the parent is reloaded inside the
    /// transaction; its depth is checked against `max_depth` and its status
    /// goes through [`StateMachine::after_child_added`] before anything is
    /// written, so a concurrent transition of the parent is never lost.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for an unknown parent,
    /// [`Error::Validation`] for a parent at max depth,
    /// [`Error::InvalidTransition`] for a parent that cannot take children,
    /// or a store error if the id is taken.
    pub fn insert_task(
        &self,
        record: &TaskRecord,
        machine: &StateMachine,
        max_depth: u32,
    ) -> Result<Insertion> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_text();

        let mut parent_split_from = None;
        if let Some(parent_id) = record.parent {
            let parent = load_task(&tx, parent_id)?.ok_or(Error::TaskNotFound(parent_id))?;
            if parent.depth >= max_depth {
                return Err(Error::Validation(format!(
                    "task #{parent_id} is at depth {}; a child would exceed max depth {max_depth}",
                    parent.depth
                )));
            }
            if let Some(status) = machine.after_child_added(parent_id, parent.status)? {
                set_status_row(&tx, parent_id, status, &now)?;
                parent_split_from = Some(parent.status);
            }
        }
        insert_row(&tx, record, &now)?;
        recompute(&tx, max_depth)?;

        let task = load_task(&tx, record.id)?.ok_or(Error::TaskNotFound(record.id))?;
        tx.commit()?;

        debug!(task_id = %task.id, parent = ?task.parent, depth = task.depth, "inserted task");
        Ok(Insertion {
            task,
            parent_split_from,
        })
    }

    /// Overwrites a task's document-backed fields and recomputes derived
    /// fields. Status changes made here bypass the state machine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] if the row or the new parent does not
    /// exist.
    pub fn update_task_fields(&self, record: &TaskRecord, max_depth: u32) -> Result<Task> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(parent) = record.parent
            && load_task(&tx, parent)?.is_none()
        {
            return Err(Error::TaskNotFound(parent));
        }
        if !update_row(&tx, record, &now_text())? {
            return Err(Error::TaskNotFound(record.id));
        }
        recompute(&tx, max_depth)?;

        let task = load_task(&tx, record.id)?.ok_or(Error::TaskNotFound(record.id))?;
        tx.commit()?;
        Ok(task)
    }

    /// Recomputes leaf flags and depths for every row. Returns the number of
    /// rows that changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn recompute_structure(&self, max_depth: u32) -> Result<usize> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let changed = recompute(&tx, max_depth)?;
        tx.commit()?;
        Ok(changed)
    }

    /// Moves a task to `to` if the state machine allows it.
    ///
    /// The read, the check and the write happen in one immediate
    /// transaction, so concurrent transitions of the same task serialize.
    /// Returns the previous status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] or [`Error::InvalidTransition`].
    pub fn set_status(&self, id: TaskId, to: TaskStatus, machine: &StateMachine) -> Result<TaskStatus> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let task = load_task(&tx, id)?.ok_or(Error::TaskNotFound(id))?;
        if machine.check(id, task.status, to)? {
            set_status_row(&tx, id, to, &now_text())?;
        }
        tx.commit()?;

        debug!(task_id = %id, from = %task.status, to = %to, "status transition");
        Ok(task.status)
    }

    /// Sets a status without consulting the state machine, but only if the
    /// task still has `expected`. Returns `false` if it did not.
    ///
    /// Used to undo a transition whose document write failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn restore_status(&self, id: TaskId, expected: TaskStatus, status: TaskStatus) -> Result<bool> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE tasks SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
            params![id.get(), expected.as_str(), status.as_str(), now_text()],
        )?;
        Ok(changed > 0)
    }

    /// Deletes a childless task and its edges, applying the last-child
    /// policy to its parent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] if the task does not exist and
    /// [`Error::Conflict`] if it still has children.
    pub fn delete_task(&self, id: TaskId, machine: &StateMachine, max_depth: u32) -> Result<Removal> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let task = load_task(&tx, id)?.ok_or(Error::TaskNotFound(id))?;
        let children = load_children(&tx, id)?;
        if !children.is_empty() {
            return Err(Error::Conflict(format!(
                "task #{id} has {} children; delete them first",
                children.len()
            )));
        }

        delete_row(&tx, id)?;

        let mut parent_status = None;
        if let Some(parent_id) = task.parent
            && let Some(parent) = load_task(&tx, parent_id)?
            && load_children(&tx, parent_id)?.is_empty()
            && let Some(status) = machine.after_last_child_removed(parent.status)
        {
            set_status_row(&tx, parent_id, status, &now_text())?;
            parent_status = Some(status);
        }

        recompute(&tx, max_depth)?;
        tx.commit()?;

        info!(task_id = %id, "deleted task");
        Ok(Removal {
            task,
            parent_status,
        })
    }

    /// Tasks connected to `id` by an edge (either direction) or by the
    /// hierarchy, ordered by relation then id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] if the task does not exist.
    pub fn related(&self, id: TaskId) -> Result<Vec<RelatedTask>> {
        let conn = self.connection()?;
        let task = load_task(&conn, id)?.ok_or(Error::TaskNotFound(id))?;

        let query = |sql: &str| -> rusqlite::Result<Vec<Task>> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE id IN ({sql}) ORDER BY id"
            ))?;
            stmt.query_map([id.get()], row_to_task)?
                .collect::<std::result::Result<Vec<_>, _>>()
        };

        let mut related = Vec::new();
        for (relation, tasks) in [
            (
                Relation::Dependency,
                query("SELECT to_id FROM task_edges WHERE from_id = ?1")?,
            ),
            (
                Relation::Dependent,
                query("SELECT from_id FROM task_edges WHERE to_id = ?1")?,
            ),
            (
                Relation::Child,
                query("SELECT id FROM tasks WHERE parent_id = ?1")?,
            ),
        ] {
            related.extend(tasks.into_iter().map(|task| RelatedTask { relation, task }));
        }
        if let Some(parent) = task.parent.map(|p| load_task(&conn, p)).transpose()?.flatten() {
            related.push(RelatedTask {
                relation: Relation::Parent,
                task: parent,
            });
        }
        related.sort_by_key(|r| (r.relation, r.task.id));
        Ok(related)
    }

    /// Task and edge counts.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn stats(&self) -> Result<Stats> {
        let conn = self.connection()?;
        let mut stats = Stats::default();

        let count = |sql: &str| -> rusqlite::Result<usize> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| usize::try_from(n).unwrap_or(0))
        };
        stats.total = count("SELECT COUNT(*) FROM tasks")?;
        stats.leaves = count("SELECT COUNT(*) FROM tasks WHERE is_leaf = 1")?;
        stats.edges = count("SELECT COUNT(*) FROM task_edges")?;

        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM tasks WHERE is_leaf = 1 GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                Ok((parse_status(0, &status)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        stats.leaves_by_status = rows
            .into_iter()
            .map(|(status, n)| (status, usize::try_from(n).unwrap_or(0)))
            .collect::<BTreeMap<_, _>>();

        Ok(stats)
    }
}

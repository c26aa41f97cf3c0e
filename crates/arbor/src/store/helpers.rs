//! Row conversion and parsing helpers.
//!
//! Also provides SQL column list constants so every query selects columns in
//! the order the `row_to_*` functions expect.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

use crate::domain::{Edge, Task, TaskId, TaskStatus};

/// SQL column list for the tasks table.
///
/// Use with [`row_to_task`].
pub(crate) const TASK_COLUMNS: &str =
    "id, parent_id, title, status, priority, depth, is_leaf, created_at, updated_at";

/// SQL column list for the `task_edges` table.
///
/// Use with [`row_to_edge`].
pub(crate) const EDGE_COLUMNS: &str = "from_id, to_id, created_at";

fn conversion_error(column: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, message.into())
}

/// Parses a status string from the database.
///
/// Returns an error for unrecognized values, indicating a corrupted or newer
/// database.
pub(crate) fn parse_status(column: usize, s: &str) -> rusqlite::Result<TaskStatus> {
    s.parse().map_err(|_| {
        conversion_error(
            column,
            Type::Text,
            format!("unknown status '{s}' in database"),
        )
    })
}

/// Parses an RFC 3339 timestamp from the database.
pub(crate) fn parse_timestamp(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, Type::Text, format!("bad timestamp '{s}': {e}")))
}

/// Reads a non-null id column.
pub(crate) fn id_at(row: &Row<'_>, column: usize) -> rusqlite::Result<TaskId> {
    let raw: i64 = row.get(column)?;
    TaskId::new(raw)
        .ok_or_else(|| conversion_error(column, Type::Integer, format!("non-positive id {raw}")))
}

/// Reads a nullable id column.
pub(crate) fn optional_id_at(row: &Row<'_>, column: usize) -> rusqlite::Result<Option<TaskId>> {
    let raw: Option<i64> = row.get(column)?;
    raw.map(|raw| {
        TaskId::new(raw).ok_or_else(|| {
            conversion_error(column, Type::Integer, format!("non-positive id {raw}"))
        })
    })
    .transpose()
}

/// Converts a row selected with [`TASK_COLUMNS`].
pub(crate) fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(3)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(Task {
        id: id_at(row, 0)?,
        parent: optional_id_at(row, 1)?,
        title: row.get(2)?,
        status: parse_status(3, &status)?,
        priority: row.get(4)?,
        depth: row.get(5)?,
        is_leaf: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
        updated_at: parse_timestamp(8, &updated_at)?,
    })
}

/// Converts a row selected with [`EDGE_COLUMNS`].
pub(crate) fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<Edge> {
    let created_at: String = row.get(2)?;
    Ok(Edge {
        from: id_at(row, 0)?,
        to: id_at(row, 1)?,
        created_at: parse_timestamp(2, &created_at)?,
    })
}

/// Current time in the stored text format.
pub(crate) fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

//! Database schema definition.
//!
//! The task table is kept apart from the edge table so Rebuild can drop and
//! recreate it without touching edges.

/// Task table DDL.
pub(crate) const TASKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER REFERENCES tasks(id) DEFERRABLE INITIALLY DEFERRED,
    title TEXT NOT NULL,
    status TEXT NOT NULL
        CHECK (status IN ('todo', 'split', 'planned', 'in_progress', 'done', 'failed')),
    priority INTEGER NOT NULL DEFAULT 0,
    is_leaf INTEGER NOT NULL DEFAULT 1,
    depth INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
";

/// Edge table DDL: `from_id` depends on `to_id`.
pub(crate) const EDGES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS task_edges (
    from_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    to_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    PRIMARY KEY (from_id, to_id),
    CHECK (from_id <> to_id)
);

CREATE INDEX IF NOT EXISTS idx_task_edges_to ON task_edges(to_id);
";

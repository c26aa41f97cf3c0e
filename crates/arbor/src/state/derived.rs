//! Derived structural fields: leaf flag and depth.
//!
//! A task is a leaf iff no task names it as parent. Depth is the number of
//! parent hops to a root. Parent chains are walked with a bound: a chain
//! longer than the maximum depth, or one that loops back on itself, yields
//! `max_depth + 1` instead of walking forever.

use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, params};
use tracing::{debug, warn};

use crate::domain::TaskId;
use crate::store::{id_at, optional_id_at};

/// Parent of each known task.
pub type ParentMap = HashMap<TaskId, Option<TaskId>>;

/// Depth of `id`, clamped to `max_depth + 1` for over-long or cyclic chains.
///
/// A parent that is not in `parents` ends the walk as if it were a root's
/// missing parent.
#[must_use]
pub fn depth_of(id: TaskId, parents: &ParentMap, max_depth: u32) -> u32 {
    let clamped = max_depth + 1;
    let mut seen = HashSet::from([id]);
    let mut depth = 0;
    let mut current = id;

    while let Some(Some(parent)) = parents.get(&current) {
        if !parents.contains_key(parent) {
            break;
        }
        if !seen.insert(*parent) || depth >= max_depth {
            return clamped;
        }
        depth += 1;
        current = *parent;
    }
    depth
}

/// Depth of every task in `parents`.
#[must_use]
pub fn compute_depths(parents: &ParentMap, max_depth: u32) -> HashMap<TaskId, u32> {
    parents
        .keys()
        .map(|&id| (id, depth_of(id, parents, max_depth)))
        .collect()
}

/// Tasks named as parent by at least one task in `parents`.
#[must_use]
pub fn non_leaves(parents: &ParentMap) -> HashSet<TaskId> {
    parents.values().filter_map(|p| *p).collect()
}

/// Recomputes `is_leaf` and `depth` for every row.
///
/// Only rows whose derived fields change are written. Returns the number of
/// rows updated. Runs inside whatever transaction the caller holds.
pub(crate) fn recompute(conn: &Connection, max_depth: u32) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare("SELECT id, parent_id, depth, is_leaf FROM tasks")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                id_at(row, 0)?,
                optional_id_at(row, 1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let parents: ParentMap = rows.iter().map(|(id, parent, _, _)| (*id, *parent)).collect();
    let depths = compute_depths(&parents, max_depth);
    let non_leaves = non_leaves(&parents);

    let mut update = conn.prepare("UPDATE tasks SET depth = ?1, is_leaf = ?2 WHERE id = ?3")?;
    let mut changed = 0;
    for (id, _, old_depth, old_leaf) in rows {
        let depth = depths.get(&id).copied().unwrap_or(0);
        let is_leaf = !non_leaves.contains(&id);
        if depth > max_depth {
            warn!(task_id = %id, max_depth, "parent chain too deep or cyclic, depth clamped");
        }
        if depth != old_depth || is_leaf != old_leaf {
            update.execute(params![depth, is_leaf, id.get()])?;
            changed += 1;
        }
    }

    debug!(changed, "recomputed leaf flags and depths");
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: i64) -> TaskId {
        TaskId::new(raw).unwrap()
    }

    fn parents(pairs: &[(i64, Option<i64>)]) -> ParentMap {
        pairs
            .iter()
            .map(|&(child, parent)| (id(child), parent.map(id)))
            .collect()
    }

    #[test]
    fn depth_follows_parent_chain() {
        let map = parents(&[(1, None), (2, Some(1)), (3, Some(2))]);
        assert_eq!(depth_of(id(1), &map, 5), 0);
        assert_eq!(depth_of(id(2), &map, 5), 1);
        assert_eq!(depth_of(id(3), &map, 5), 2);
    }

    #[test]
    fn chain_at_max_depth_is_not_clamped() {
        let map = parents(&[(1, None), (2, Some(1)), (3, Some(2))]);
        assert_eq!(depth_of(id(3), &map, 2), 2);
    }

    #[test]
    fn over_long_chain_is_clamped() {
        let map = parents(&[(1, None), (2, Some(1)), (3, Some(2)), (4, Some(3))]);
        assert_eq!(depth_of(id(4), &map, 2), 3);
    }

    #[test]
    fn cycle_is_clamped() {
        let map = parents(&[(1, Some(2)), (2, Some(1))]);
        assert_eq!(depth_of(id(1), &map, 5), 6);
        assert_eq!(depth_of(id(2), &map, 5), 6);
    }

    #[test]
    fn self_parent_is_clamped() {
        let map = parents(&[(1, Some(1))]);
        assert_eq!(depth_of(id(1), &map, 5), 6);
    }

    #[test]
    fn unknown_parent_ends_walk() {
        let map = parents(&[(2, Some(9))]);
        assert_eq!(depth_of(id(2), &map, 5), 0);
    }

    #[test]
    fn non_leaves_are_referenced_parents() {
        let map = parents(&[(1, None), (2, Some(1)), (3, Some(1)), (4, Some(3))]);
        let inner = non_leaves(&map);
        assert_eq!(inner, HashSet::from([id(1), id(3)]));
    }
}

//! Cycle prevention for dependency edges.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use super::EdgeSource;
use crate::domain::TaskId;
use crate::error::{Error, Result};

/// Reachability check run before every edge insertion.
///
/// The guard never writes. Callers that insert must run it in the same
/// serializing transaction as the insert.
#[derive(Debug, Clone, Copy)]
pub struct CycleGuard<'a, S: ?Sized> {
    source: &'a S,
}

impl<'a, S: EdgeSource + ?Sized> CycleGuard<'a, S> {
    /// Creates a guard reading edges from `source`.
    pub const fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Finds the cycle that `from -> to` would close.
    ///
    /// Searches breadth-first from `to` along existing dependencies, visiting
    /// neighbours in ascending id order, for `from`. The returned path starts
    /// and ends at `to`: with `1 -> 2` present, adding `2 -> 1` yields
    /// `[1, 2, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if edges cannot be read.
    pub fn would_create_cycle(&self, from: TaskId, to: TaskId) -> Result<Option<Vec<TaskId>>> {
        if from == to {
            return Ok(Some(vec![from, to]));
        }

        let mut came_from: HashMap<TaskId, TaskId> = HashMap::new();
        let mut queue = VecDeque::from([to]);
        came_from.insert(to, to);

        while let Some(current) = queue.pop_front() {
            if current == from {
                let mut path = vec![from];
                let mut node = from;
                while node != to {
                    node = came_from[&node];
                    path.push(node);
                }
                path.reverse();
                path.push(to);
                return Ok(Some(path));
            }
            for next in self.source.dependencies_of(current)? {
                if let std::collections::hash_map::Entry::Vacant(slot) = came_from.entry(next) {
                    slot.insert(current);
                    queue.push_back(next);
                }
            }
        }
        Ok(None)
    }

    /// Validates `from -> to` for insertion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] for a self-loop or an existing edge and
    /// [`Error::Cycle`] if the edge would close a cycle.
    pub fn check(&self, from: TaskId, to: TaskId) -> Result<()> {
        if from == to {
            return Err(Error::Conflict(format!("task #{from} cannot depend on itself")));
        }
        if self.source.has_edge(from, to)? {
            return Err(Error::Conflict(format!("edge #{from} -> #{to} already exists")));
        }
        if let Some(path) = self.would_create_cycle(from, to)? {
            debug!(from = %from, to = %to, ?path, "rejected edge closing a cycle");
            return Err(Error::Cycle { path });
        }
        Ok(())
    }
}

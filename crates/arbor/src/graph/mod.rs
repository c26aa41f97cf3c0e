//! Dependency graph algorithms.
//!
//! - [`CycleGuard`] - reachability check gating every edge insertion
//! - [`GraphScheduler`] - topological order and executable-task selection
//!
//! The hierarchy (parent/child) is not part of this graph; only dependency
//! edges are.

mod cycle;
mod schedule;

pub use cycle::CycleGuard;
pub use schedule::GraphScheduler;

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;

use crate::domain::{Edge, TaskId};
use crate::error::Result;

/// Read access to dependency edges.
///
/// Implemented by the in-memory [`DependencyGraph`] and by the store's
/// connection, so the same guard runs against either.
pub trait EdgeSource {
    /// Tasks `id` depends on, in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the edges cannot be read.
    fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskId>>;

    /// Returns `true` if the edge `from -> to` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the edges cannot be read.
    fn has_edge(&self, from: TaskId, to: TaskId) -> Result<bool>;
}

/// In-memory dependency graph: an edge `a -> b` means `a` depends on `b`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<TaskId, ()>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from stored edges.
    #[must_use]
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a Edge>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.add_edge(edge.from, edge.to);
        }
        graph
    }

    /// Adds a node with no edges (no-op if present).
    pub fn add_task(&mut self, id: TaskId) {
        self.graph.add_node(id);
    }

    /// Adds `from -> to` without any checks.
    pub fn add_edge(&mut self, from: TaskId, to: TaskId) {
        self.graph.add_edge(from, to, ());
    }

    /// Returns `true` if the node is present.
    #[must_use]
    pub fn contains_task(&self, id: TaskId) -> bool {
        self.graph.contains_node(id)
    }

    /// Tasks `id` depends on, ascending.
    #[must_use]
    pub fn dependencies(&self, id: TaskId) -> Vec<TaskId> {
        self.sorted_neighbors(id, Direction::Outgoing)
    }

    /// Tasks depending on `id`, ascending.
    #[must_use]
    pub fn dependents(&self, id: TaskId) -> Vec<TaskId> {
        self.sorted_neighbors(id, Direction::Incoming)
    }

    fn sorted_neighbors(&self, id: TaskId, direction: Direction) -> Vec<TaskId> {
        if !self.graph.contains_node(id) {
            return Vec::new();
        }
        let mut ids: Vec<TaskId> = self.graph.neighbors_directed(id, direction).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub(crate) fn inner(&self) -> &DiGraphMap<TaskId, ()> {
        &self.graph
    }
}

impl EdgeSource for DependencyGraph {
    fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskId>> {
        Ok(self.dependencies(id))
    }

    fn has_edge(&self, from: TaskId, to: TaskId) -> Result<bool> {
        Ok(self.graph.contains_edge(from, to))
    }
}

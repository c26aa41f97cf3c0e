//! Ordering and executable-task selection over a snapshot.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use petgraph::algo::tarjan_scc;
use tracing::error;

use super::DependencyGraph;
use crate::domain::{Edge, Task, TaskId, TaskStatus};

/// Scheduler over a consistent snapshot of tasks and edges.
///
/// Built from [`GraphStore::snapshot`](crate::store::GraphStore::snapshot);
/// answers are only as fresh as the snapshot.
#[derive(Debug, Clone)]
pub struct GraphScheduler {
    tasks: BTreeMap<TaskId, Task>,
    graph: DependencyGraph,
}

impl GraphScheduler {
    /// Creates a scheduler from tasks and their dependency edges.
    #[must_use]
    pub fn new(tasks: Vec<Task>, edges: &[Edge]) -> Self {
        let mut graph = DependencyGraph::from_edges(edges);
        let tasks: BTreeMap<TaskId, Task> = tasks.into_iter().map(|t| (t.id, t)).collect();
        for &id in tasks.keys() {
            graph.add_task(id);
        }
        Self { tasks, graph }
    }

    /// Looks up a task in the snapshot.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Dependency graph of the snapshot.
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// All tasks with dependencies before dependents, ties broken by
    /// ascending id.
    ///
    /// Tasks on or behind a cycle cannot be ordered and are left out; that
    /// is logged as an invariant violation.
    #[must_use]
    pub fn topological_order(&self) -> Vec<TaskId> {
        let mut outstanding: HashMap<TaskId, usize> = self
            .tasks
            .keys()
            .map(|&id| {
                let known = self
                    .graph
                    .dependencies(id)
                    .into_iter()
                    .filter(|dep| self.tasks.contains_key(dep))
                    .count();
                (id, known)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<TaskId>> = outstanding
            .iter()
            .filter(|&(_, &n)| n == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for dependent in self.graph.dependents(id) {
                if let Some(n) = outstanding.get_mut(&dependent) {
                    *n -= 1;
                    if *n == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }

        if order.len() < self.tasks.len() {
            let mut omitted: Vec<TaskId> = outstanding
                .into_iter()
                .filter(|&(_, n)| n > 0)
                .map(|(id, _)| id)
                .collect();
            omitted.sort_unstable();
            error!(
                ?omitted,
                "dependency cycle found while ordering; tasks left out"
            );
        }
        order
    }

    /// Returns `true` if `id` is a `planned` leaf whose dependencies are all
    /// `done`. A dependency missing from the snapshot counts as incomplete.
    #[must_use]
    pub fn is_executable(&self, id: TaskId) -> bool {
        let Some(task) = self.tasks.get(&id) else {
            return false;
        };
        task.is_leaf
            && task.status.is_ready_for_execution()
            && self.graph.dependencies(id).into_iter().all(|dep| {
                self.tasks
                    .get(&dep)
                    .is_some_and(|t| t.status.is_success())
            })
    }

    /// Every executable task, ascending id.
    #[must_use]
    pub fn executable(&self) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|t| self.is_executable(t.id))
            .collect()
    }

    /// The lowest-id executable task.
    #[must_use]
    pub fn next_executable(&self) -> Option<&Task> {
        self.tasks.values().find(|t| self.is_executable(t.id))
    }

    /// `todo` leaves awaiting a plan, shallowest first, then by id.
    #[must_use]
    pub fn plannable(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.is_leaf && t.status == TaskStatus::Todo)
            .collect();
        tasks.sort_by_key(|t| (t.depth, t.id));
        tasks
    }

    /// Strongly connected components with more than one task, each sorted,
    /// ordered by their smallest id. Empty when the guard has held.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<TaskId>> {
        let mut cycles: Vec<Vec<TaskId>> = tarjan_scc(self.graph.inner())
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|mut component| {
                component.sort_unstable();
                component
            })
            .collect();
        cycles.sort();
        cycles
    }
}

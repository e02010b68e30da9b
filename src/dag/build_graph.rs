// src/dag/build_graph.rs

use std::collections::HashSet;
use std::sync::Arc;

use crate::dag::graph::DependencyGraph;
use crate::dag::task::{Task, TaskId};

/// A resolved execution order: tasks grouped into levels that can each run
/// concurrently once every earlier level has finished.
#[derive(Debug, Clone)]
pub struct BuildGraph {
    levels: Vec<Vec<Arc<Task>>>,
    graph: Arc<DependencyGraph>,
}

impl BuildGraph {
    pub(crate) fn new(levels: Vec<Vec<Arc<Task>>>, graph: Arc<DependencyGraph>) -> Self {
        Self { levels, graph }
    }

    pub fn levels(&self) -> &[Vec<Arc<Task>>] {
        &self.levels
    }

    /// The full graph this order was resolved from.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// All tasks in execution order.
    pub fn tasks(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.levels.iter().flatten()
    }

    pub fn task_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks().any(|t| t.id == id)
    }

    /// Restrict the order to the tasks in `keep`, dropping levels that end up
    /// empty. Relative order is preserved.
    pub fn subgraph(&self, keep: &HashSet<TaskId>) -> BuildGraph {
        let levels = self
            .levels
            .iter()
            .map(|level| {
                level
                    .iter()
                    .filter(|t| keep.contains(&t.id))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|level| !level.is_empty())
            .collect();

        BuildGraph {
            levels,
            graph: Arc::clone(&self.graph),
        }
    }

    /// The sub-order made of `seeds` and everything downstream of them.
    pub fn with_dependents<'a, I>(&self, seeds: I) -> BuildGraph
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep = self.graph.dependents_closure(seeds);
        self.subgraph(&keep)
    }
}

// src/dag/graph.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::dag::build_graph::BuildGraph;
use crate::dag::task::{Task, TaskId};
use crate::errors::{Result, SitepipeError};

/// Directed acyclic graph of tasks keyed by id.
///
/// Edge direction is dependency -> dependent: for a task `B` with
/// `after = ["A"]` the graph holds the edge `A -> B`.
///
/// Predecessors may be referenced before they are added; such forward
/// references are kept as placeholder nodes and only reported as
/// [`SitepipeError::UnknownDependency`] by [`DependencyGraph::resolve_order`]
/// if they are still missing at that point.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<TaskId, ()>,
    index: HashMap<TaskId, NodeIndex>,
    tasks: HashMap<TaskId, Arc<Task>>,
    /// Task ids in the order they were added.
    order: Vec<TaskId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task and its dependency edges.
    ///
    /// Fails without modifying the graph if the id is already present or if
    /// any of the new edges would close a cycle.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(SitepipeError::DuplicateTask(task.id));
        }

        if task.after.iter().any(|dep| dep == &task.id) {
            return Err(SitepipeError::Cycle {
                task: task.id.clone(),
                via: task.id,
            });
        }

        // A placeholder node created by an earlier forward reference may
        // already have dependents. Adding `dep -> task` closes a cycle iff
        // `dep` is reachable from `task`.
        if let Some(&node) = self.index.get(&task.id) {
            for dep in &task.after {
                if let Some(&dep_node) = self.index.get(dep) {
                    if has_path_connecting(&self.graph, node, dep_node, None) {
                        return Err(SitepipeError::Cycle {
                            task: task.id.clone(),
                            via: dep.clone(),
                        });
                    }
                }
            }
        }

        let node = self.ensure_node(&task.id);
        for dep in &task.after {
            let dep_node = self.ensure_node(dep);
            self.graph.update_edge(dep_node, node, ());
        }

        self.order.push(task.id.clone());
        self.tasks.insert(task.id.clone(), Arc::new(task));
        Ok(())
    }

    /// Partition the tasks into levels.
    ///
    /// Level 0 holds tasks without predecessors; every other task sits one
    /// level above its deepest predecessor. Within a level tasks keep their
    /// declaration order.
    pub fn resolve_order(&self) -> Result<BuildGraph> {
        for id in &self.order {
            let task = &self.tasks[id];
            for dep in &task.after {
                if !self.tasks.contains_key(dep) {
                    return Err(SitepipeError::UnknownDependency {
                        task: id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let id = self.graph[cycle.node_id()].clone();
            SitepipeError::Cycle {
                task: id.clone(),
                via: id,
            }
        })?;

        let mut depth: HashMap<NodeIndex, usize> = HashMap::with_capacity(sorted.len());
        for node in sorted {
            let level = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .map(|dep| depth[&dep] + 1)
                .max()
                .unwrap_or(0);
            depth.insert(node, level);
        }

        let mut levels: Vec<Vec<Arc<Task>>> = Vec::new();
        for id in &self.order {
            let level = depth[&self.index[id]];
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(Arc::clone(&self.tasks[id]));
        }

        Ok(BuildGraph::new(levels, Arc::new(self.clone())))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn task(&self, id: &str) -> Option<&Arc<Task>> {
        self.tasks.get(id)
    }

    /// Task ids in declaration order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Immediate dependents of a task (tasks that list it in their `after`).
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(|n| self.graph[n].as_str())
            .collect()
    }

    /// `seeds` plus every task that transitively depends on one of them.
    pub fn dependents_closure<'a, I>(&self, seeds: I) -> HashSet<TaskId>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = HashSet::new();
        for seed in seeds {
            let Some(&start) = self.index.get(seed) else {
                continue;
            };
            let mut dfs = Dfs::new(&self.graph, start);
            while let Some(node) = dfs.next(&self.graph) {
                let id = &self.graph[node];
                if self.tasks.contains_key(id) {
                    out.insert(id.clone());
                }
            }
        }
        out
    }

    fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&node) = self.index.get(id) {
            return node;
        }
        let node = self.graph.add_node(id.to_string());
        self.index.insert(id.to_string(), node);
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::StageConfig;

    fn task(id: &str, after: &[&str]) -> Task {
        Task::new(
            id,
            after.iter().map(|s| s.to_string()).collect(),
            vec![],
            vec![],
            id,
            StageConfig::Copy { base: None },
        )
        .unwrap()
    }

    fn level_ids(g: &BuildGraph) -> Vec<Vec<String>> {
        g.levels()
            .iter()
            .map(|l| l.iter().map(|t| t.id.clone()).collect())
            .collect()
    }

    #[test]
    fn levels_follow_dependencies_and_declaration_order() {
        let mut g = DependencyGraph::new();
        g.add_task(task("c", &["a", "b"])).unwrap();
        g.add_task(task("b", &[])).unwrap();
        g.add_task(task("a", &[])).unwrap();
        g.add_task(task("d", &["a"])).unwrap();

        let order = g.resolve_order().unwrap();
        assert_eq!(
            level_ids(&order),
            vec![vec!["b", "a"], vec!["c", "d"]]
                .into_iter()
                .map(|l| l.into_iter().map(String::from).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn duplicate_task_is_rejected() {
        let mut g = DependencyGraph::new();
        g.add_task(task("a", &[])).unwrap();
        let err = g.add_task(task("a", &[])).unwrap_err();
        assert!(matches!(err, SitepipeError::DuplicateTask(id) if id == "a"));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut g = DependencyGraph::new();
        let err = g.add_task(task("a", &["a"])).unwrap_err();
        assert!(matches!(err, SitepipeError::Cycle { .. }));
        assert!(g.is_empty());
    }

    #[test]
    fn cycle_through_forward_reference_is_rejected() {
        let mut g = DependencyGraph::new();
        g.add_task(task("a", &["c"])).unwrap();
        g.add_task(task("b", &["a"])).unwrap();
        let err = g.add_task(task("c", &["b"])).unwrap_err();
        assert!(matches!(err, SitepipeError::Cycle { ref task, .. } if task == "c"));

        // The rejected task left nothing behind.
        assert!(!g.contains("c"));
        let err = g.resolve_order().unwrap_err();
        assert!(matches!(
            err,
            SitepipeError::UnknownDependency { ref task, ref dependency } if task == "a" && dependency == "c"
        ));
    }

    #[test]
    fn dependents_closure_is_transitive() {
        let mut g = DependencyGraph::new();
        g.add_task(task("a", &[])).unwrap();
        g.add_task(task("b", &["a"])).unwrap();
        g.add_task(task("c", &["b"])).unwrap();
        g.add_task(task("x", &[])).unwrap();

        let closure = g.dependents_closure(["b"]);
        let mut ids: Vec<_> = closure.into_iter().collect();
        ids.sort();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(g.dependents_of("a"), vec!["b"]);
    }
}

// src/watch/affected.rs

use std::collections::BTreeSet;

use crate::dag::{BuildGraph, TaskId};

/// Tasks whose input patterns match one of `changed` (project-relative
/// paths), plus every task that transitively depends on them.
pub fn affected_tasks(graph: &BuildGraph, changed: &[String]) -> BTreeSet<TaskId> {
    let seeds: Vec<&str> = graph
        .tasks()
        .filter(|task| changed.iter().any(|rel| task.patterns().matches(rel)))
        .map(|task| task.id.as_str())
        .collect();

    graph
        .graph()
        .dependents_closure(seeds)
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::StageConfig;
    use crate::dag::{DependencyGraph, Task};

    fn graph() -> BuildGraph {
        let mut g = DependencyGraph::new();
        let specs: [(&str, &[&str], &[&str]); 4] = [
            ("html", &["app/**/*.md"], &[]),
            ("css", &["app/scss/**/*.scss"], &[]),
            ("inline", &["dist/**/*.html"], &["html", "css"]),
            ("sw", &[], &["inline"]),
        ];
        for (id, inputs, after) in specs {
            let task = Task::new(
                id,
                after.iter().map(|s| s.to_string()).collect(),
                inputs.iter().map(|s| s.to_string()).collect(),
                vec![],
                id,
                StageConfig::Copy { base: None },
            )
            .unwrap();
            g.add_task(task).unwrap();
        }
        g.resolve_order().unwrap()
    }

    #[test]
    fn matching_task_and_dependents_are_affected() {
        let affected = affected_tasks(&graph(), &["app/scss/main.scss".to_string()]);
        let ids: Vec<_> = affected.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["css", "inline", "sw"]);
    }

    #[test]
    fn unrelated_change_affects_nothing() {
        assert!(affected_tasks(&graph(), &["README.md".to_string()]).is_empty());
    }
}

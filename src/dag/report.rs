// src/dag/report.rs

use std::fmt;
use std::time::Duration;

use crate::dag::task::TaskId;
use crate::errors::SitepipeError;

/// Final state of one task in one scheduler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The stage ran and its outputs (project-relative) were promoted.
    Succeeded { outputs: Vec<String> },
    /// Skipped on a cache hit.
    Cached,
    Failed { message: String },
    /// An earlier level failed before this task's level started.
    NotAttempted,
    /// The run was cancelled before or while this task executed.
    Cancelled,
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Succeeded { .. } => "ok",
            TaskOutcome::Cached => "cached",
            TaskOutcome::Failed { .. } => "FAILED",
            TaskOutcome::NotAttempted => "not attempted",
            TaskOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub id: TaskId,
    pub level: usize,
    pub outcome: TaskOutcome,
    pub elapsed: Duration,
}

/// Aggregated per-task outcomes of one run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub tasks: Vec<TaskReport>,
    pub elapsed: Duration,
}

impl BuildReport {
    /// True iff every task succeeded or was a cache hit.
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|t| {
            matches!(
                t.outcome,
                TaskOutcome::Succeeded { .. } | TaskOutcome::Cached
            )
        })
    }

    pub fn was_cancelled(&self) -> bool {
        self.tasks
            .iter()
            .any(|t| t.outcome == TaskOutcome::Cancelled)
    }

    pub fn outcome(&self, id: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|t| t.id == id).map(|t| &t.outcome)
    }

    /// Ids of tasks whose stage actually ran to success.
    pub fn executed(&self) -> Vec<&str> {
        self.ids_where(|o| matches!(o, TaskOutcome::Succeeded { .. }))
    }

    pub fn cached(&self) -> Vec<&str> {
        self.ids_where(|o| *o == TaskOutcome::Cached)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.ids_where(|o| matches!(o, TaskOutcome::Failed { .. }))
    }

    /// One [`SitepipeError::StageExecution`] per failed task.
    pub fn errors(&self) -> Vec<SitepipeError> {
        self.tasks
            .iter()
            .filter_map(|t| match &t.outcome {
                TaskOutcome::Failed { message } => Some(SitepipeError::StageExecution {
                    task: t.id.clone(),
                    message: message.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn not_attempted(&self) -> Vec<&str> {
        self.ids_where(|o| *o == TaskOutcome::NotAttempted)
    }

    fn ids_where(&self, pred: impl Fn(&TaskOutcome) -> bool) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| pred(&t.outcome))
            .map(|t| t.id.as_str())
            .collect()
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.tasks {
            write!(
                f,
                "  [{}] {:<20} {:>13}  {}ms",
                t.level,
                t.id,
                t.outcome.label(),
                t.elapsed.as_millis()
            )?;
            if let TaskOutcome::Failed { message } = &t.outcome {
                for line in message.lines() {
                    write!(f, "\n      {}", line)?;
                }
            }
            writeln!(f)?;
        }
        write!(
            f,
            "{} ran, {} cached, {} failed, {} not attempted in {}ms",
            self.executed().len(),
            self.cached().len(),
            self.failed().len(),
            self.not_attempted().len(),
            self.elapsed.as_millis()
        )
    }
}

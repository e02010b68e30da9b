// src/engine/core.rs

//! Pure watch-controller state machine.
//!
//! [`WatchCore`] consumes [`WatchEvent`]s and returns [`CoreStep`]s telling
//! the async shell (`engine::runtime::WatchRuntime`) which runs to start or
//! cancel. It owns no channels, tokio types or filesystem handles, so its
//! semantics are unit tested directly.

use std::collections::BTreeSet;

use crate::dag::{BuildGraph, TaskId};
use crate::engine::WatchEvent;
use crate::engine::event_handlers::{
    ActiveRun, CoreStep, RunState, handle_files_changed, handle_run_finished, handle_shutdown,
};
use crate::watch::affected_tasks;

#[derive(Debug)]
pub struct WatchCore {
    graph: BuildGraph,
    state: RunState,
}

impl WatchCore {
    pub fn new(graph: BuildGraph) -> Self {
        Self {
            graph,
            state: RunState::default(),
        }
    }

    pub fn graph(&self) -> &BuildGraph {
        &self.graph
    }

    pub fn active_run(&self) -> Option<&ActiveRun> {
        self.state.active.as_ref()
    }

    pub fn queued(&self) -> &BTreeSet<TaskId> {
        &self.state.queued
    }

    pub fn is_idle(&self) -> bool {
        self.state.active.is_none()
    }

    /// The initial full build every watch session starts with.
    pub fn start_initial(&mut self) -> CoreStep {
        let all: BTreeSet<TaskId> = self.graph.tasks().map(|t| t.id.clone()).collect();
        let cmd = self.state.start(all);
        CoreStep {
            commands: vec![cmd],
            keep_running: true,
        }
    }

    pub fn step(&mut self, event: WatchEvent) -> CoreStep {
        match event {
            WatchEvent::FilesChanged(paths) => {
                let affected = affected_tasks(&self.graph, &paths);
                handle_files_changed(&mut self.state, affected)
            }
            WatchEvent::RunFinished { run_id } => handle_run_finished(&mut self.state, run_id),
            WatchEvent::ShutdownRequested => handle_shutdown(&mut self.state),
        }
    }
}

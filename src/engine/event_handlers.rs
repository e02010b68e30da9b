// src/engine/event_handlers.rs

//! Event handling logic for the watch core.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::dag::TaskId;
use crate::engine::RunId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Run the subgraph made of `tasks`.
    StartRun { run_id: RunId, tasks: BTreeSet<TaskId> },
    /// Cooperatively cancel the run with this id.
    CancelRun { run_id: RunId },
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn keep(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRun {
    pub run_id: RunId,
    pub tasks: BTreeSet<TaskId>,
    pub cancel_requested: bool,
}

/// Mutable run bookkeeping owned by the core.
#[derive(Debug, Default)]
pub struct RunState {
    pub(crate) last_run_id: RunId,
    pub(crate) active: Option<ActiveRun>,
    /// Tasks to run once the active run has finished.
    pub(crate) queued: BTreeSet<TaskId>,
    pub(crate) shutting_down: bool,
}

impl RunState {
    pub(crate) fn start(&mut self, tasks: BTreeSet<TaskId>) -> CoreCommand {
        self.last_run_id += 1;
        let run_id = self.last_run_id;
        info!(run_id, tasks = tasks.len(), "starting run");
        self.active = Some(ActiveRun {
            run_id,
            tasks: tasks.clone(),
            cancel_requested: false,
        });
        CoreCommand::StartRun { run_id, tasks }
    }
}

/// Handle a debounced change batch, already mapped to `affected` tasks.
///
/// - Idle: start a run over the affected subgraph.
/// - A run is active: cancel it and queue the union of its tasks and the
///   affected set; the queued run starts once the cancelled run finishes.
pub fn handle_files_changed(state: &mut RunState, affected: BTreeSet<TaskId>) -> CoreStep {
    if state.shutting_down {
        return CoreStep::keep(Vec::new());
    }
    if affected.is_empty() {
        debug!("change batch affects no task");
        return CoreStep::keep(Vec::new());
    }

    let Some(active) = state.active.as_mut() else {
        let cmd = state.start(affected);
        return CoreStep::keep(vec![cmd]);
    };

    state.queued.extend(active.tasks.iter().cloned());
    state.queued.extend(affected);

    if active.cancel_requested {
        return CoreStep::keep(Vec::new());
    }

    active.cancel_requested = true;
    info!(run_id = active.run_id, queued = state.queued.len(), "superseding active run");
    CoreStep::keep(vec![CoreCommand::CancelRun {
        run_id: active.run_id,
    }])
}

/// Handle the end of a run (finished, failed or cancelled).
pub fn handle_run_finished(state: &mut RunState, run_id: RunId) -> CoreStep {
    match &state.active {
        Some(active) if active.run_id == run_id => {}
        _ => {
            debug!(run_id, "ignoring finish of unknown run");
            return CoreStep::keep(Vec::new());
        }
    }
    state.active = None;

    if state.shutting_down {
        return CoreStep {
            commands: Vec::new(),
            keep_running: false,
        };
    }

    if state.queued.is_empty() {
        return CoreStep::keep(Vec::new());
    }

    let tasks = std::mem::take(&mut state.queued);
    let cmd = state.start(tasks);
    CoreStep::keep(vec![cmd])
}

/// Handle Ctrl-C: cancel any active run and exit once it has finished.
pub fn handle_shutdown(state: &mut RunState) -> CoreStep {
    state.shutting_down = true;
    state.queued.clear();

    match state.active.as_mut() {
        None => CoreStep {
            commands: Vec::new(),
            keep_running: false,
        },
        Some(active) if active.cancel_requested => CoreStep::keep(Vec::new()),
        Some(active) => {
            active.cancel_requested = true;
            CoreStep::keep(vec![CoreCommand::CancelRun {
                run_id: active.run_id,
            }])
        }
    }
}

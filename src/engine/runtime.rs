// src/engine/runtime.rs

use std::fmt;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cache::IncrementalCache;
use crate::dag::{BuildReport, CancelToken, Scheduler};
use crate::errors::Result;

use super::core::WatchCore;
use super::{CoreCommand, RunId, WatchEvent};

/// Messages flowing into the runtime from the debouncer, the Ctrl-C
/// listener and finished scheduler runs.
pub enum RuntimeMessage {
    Event(WatchEvent),
    RunDone(Box<FinishedRun>),
}

impl From<WatchEvent> for RuntimeMessage {
    fn from(event: WatchEvent) -> Self {
        RuntimeMessage::Event(event)
    }
}

impl fmt::Debug for RuntimeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeMessage::Event(e) => f.debug_tuple("Event").field(e).finish(),
            RuntimeMessage::RunDone(done) => f.debug_tuple("RunDone").field(&done.run_id).finish(),
        }
    }
}

/// A run handing back the scheduler and cache it borrowed.
pub struct FinishedRun {
    pub run_id: RunId,
    pub scheduler: Scheduler,
    pub cache: IncrementalCache,
    pub report: BuildReport,
}

/// Async IO shell around [`WatchCore`].
///
/// Owns the scheduler and the incremental cache while idle and lends them
/// to a spawned run. All decisions come from the core; this type only reads
/// messages, executes [`CoreCommand`]s and reports results.
pub struct WatchRuntime {
    core: WatchCore,
    idle: Option<(Scheduler, IncrementalCache)>,
    in_flight: Option<(RunId, CancelToken)>,
    /// Changed project-relative paths whose memoized hashes must be dropped
    /// before the next run starts.
    stale_paths: Vec<PathBuf>,
    tx: mpsc::Sender<RuntimeMessage>,
    rx: mpsc::Receiver<RuntimeMessage>,
    reports: Vec<(RunId, BuildReport)>,
}

impl fmt::Debug for WatchRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRuntime")
            .field("core", &self.core)
            .field("in_flight", &self.in_flight.as_ref().map(|(id, _)| *id))
            .finish_non_exhaustive()
    }
}

impl WatchRuntime {
    pub fn new(core: WatchCore, scheduler: Scheduler, cache: IncrementalCache) -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            core,
            idle: Some((scheduler, cache)),
            in_flight: None,
            stale_paths: Vec::new(),
            tx,
            rx,
            reports: Vec::new(),
        }
    }

    /// Sender for the debouncer and the Ctrl-C listener.
    pub fn sender(&self) -> mpsc::Sender<RuntimeMessage> {
        self.tx.clone()
    }

    /// Main event loop. Starts with a full build, then reacts to messages
    /// until the core asks to stop.
    ///
    /// Returns the report of every run, in completion order.
    pub async fn run(mut self) -> Result<Vec<(RunId, BuildReport)>> {
        info!("watch runtime started");

        let step = self.core.start_initial();
        self.execute_commands(step.commands);

        loop {
            let Some(message) = self.rx.recv().await else {
                info!("runtime channel closed; exiting");
                break;
            };

            let event = match message {
                RuntimeMessage::Event(event) => {
                    debug!(?event, "runtime received event");
                    if let WatchEvent::FilesChanged(paths) = &event {
                        self.note_changed(paths);
                    }
                    event
                }
                RuntimeMessage::RunDone(done) => self.finish_run(*done),
            };

            let step = self.core.step(event);
            self.execute_commands(step.commands);

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("watch runtime exiting");
        Ok(self.reports)
    }

    fn note_changed(&mut self, paths: &[String]) {
        self.stale_paths.extend(paths.iter().map(PathBuf::from));
    }

    fn finish_run(&mut self, done: FinishedRun) -> WatchEvent {
        let FinishedRun {
            run_id,
            scheduler,
            cache,
            report,
        } = done;

        if report.was_cancelled() {
            info!(run_id, "run cancelled");
        } else {
            println!("run {run_id}:\n{report}");
        }

        self.idle = Some((scheduler, cache));
        self.in_flight = None;
        self.reports.push((run_id, report));
        WatchEvent::RunFinished { run_id }
    }

    fn execute_commands(&mut self, commands: Vec<CoreCommand>) {
        for command in commands {
            match command {
                CoreCommand::StartRun { run_id, tasks } => self.start_run(run_id, tasks),
                CoreCommand::CancelRun { run_id } => match &self.in_flight {
                    Some((active, token)) if *active == run_id => {
                        info!(run_id, "cancelling run");
                        token.cancel();
                    }
                    _ => debug!(run_id, "cancel for run that is not in flight"),
                },
            }
        }
    }

    fn start_run(&mut self, run_id: RunId, tasks: std::collections::BTreeSet<String>) {
        let Some((mut scheduler, cache)) = self.idle.take() else {
            error!(run_id, "run requested while another run holds the scheduler");
            return;
        };

        let root = scheduler.settings().project_root.clone();
        for rel in self.stale_paths.drain(..) {
            scheduler.resolver_mut().invalidate(&root.join(rel));
        }

        let keep = tasks.into_iter().collect();
        let graph = self.core.graph().subgraph(&keep);
        let token = CancelToken::new();
        self.in_flight = Some((run_id, token.clone()));

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut cache = cache;
            let report = scheduler.execute(&graph, &mut cache, &token).await;
            let done = FinishedRun {
                run_id,
                scheduler,
                cache,
                report,
            };
            if tx.send(RuntimeMessage::RunDone(Box::new(done))).await.is_err() {
                warn!(run_id, "runtime gone before run finished");
            }
        });
    }
}

/// Forward Ctrl-C to the runtime as [`WatchEvent::ShutdownRequested`].
pub fn spawn_ctrl_c_listener(tx: mpsc::Sender<RuntimeMessage>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        let _ = tx.send(WatchEvent::ShutdownRequested.into()).await;
    });
}

// src/dag/scheduler.rs

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow, bail};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::hash::compute_bytes_hash;
use crate::cache::store::{CacheKey, IncrementalCache};
use crate::config::settings::BuildSettings;
use crate::dag::build_graph::BuildGraph;
use crate::dag::cancel::CancelToken;
use crate::dag::report::{BuildReport, TaskOutcome, TaskReport};
use crate::dag::task::{Task, TaskId};
use crate::fileset::{FileSetResolver, relative_str};
use crate::fs::RealFileSystem;
use crate::stage::{Stage, StageInvocation, StageRegistry};

/// Executes a [`BuildGraph`] level by level.
///
/// Within a level every task that misses the cache is started concurrently,
/// bounded by `concurrency`, and the whole level is awaited before the next
/// one begins. A failure lets its siblings finish but stops all later
/// levels. Only tasks whose stage succeeded get a cache entry.
#[derive(Debug)]
pub struct Scheduler {
    settings: BuildSettings,
    stages: StageRegistry,
    resolver: FileSetResolver,
}

/// A task that missed the cache and is about to run.
struct PendingTask {
    task: Arc<Task>,
    key: CacheKey,
    stage: Arc<dyn Stage>,
    invocation: StageInvocation,
    prepared_in: Duration,
}

type StageHandle = JoinHandle<(anyhow::Result<Vec<PathBuf>>, Duration, StageInvocation)>;

impl Scheduler {
    pub fn new(settings: BuildSettings, stages: StageRegistry) -> Self {
        let resolver = FileSetResolver::new(Arc::new(RealFileSystem), settings.project_root.clone())
            .skip_dir(settings.state_dir());
        Self::with_resolver(settings, stages, resolver)
    }

    pub fn with_resolver(settings: BuildSettings, stages: StageRegistry, resolver: FileSetResolver) -> Self {
        Self {
            settings,
            stages,
            resolver,
        }
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn resolver_mut(&mut self) -> &mut FileSetResolver {
        &mut self.resolver
    }

    /// Run `graph` to completion (or until `cancel` fires).
    pub async fn execute(
        &mut self,
        graph: &BuildGraph,
        cache: &mut IncrementalCache,
        cancel: &CancelToken,
    ) -> BuildReport {
        let started = Instant::now();
        let mut reports: Vec<TaskReport> = Vec::with_capacity(graph.task_count());
        let mut executed: HashSet<TaskId> = HashSet::new();
        let mut halted = false;

        info!(
            levels = graph.levels().len(),
            tasks = graph.task_count(),
            concurrency = self.settings.concurrency,
            "build started"
        );

        for (level, tasks) in graph.levels().iter().enumerate() {
            if halted || cancel.is_cancelled() {
                let outcome = if cancel.is_cancelled() {
                    TaskOutcome::Cancelled
                } else {
                    TaskOutcome::NotAttempted
                };
                reports.extend(tasks.iter().map(|t| TaskReport {
                    id: t.id.clone(),
                    level,
                    outcome: outcome.clone(),
                    elapsed: Duration::ZERO,
                }));
                continue;
            }

            debug!(level, tasks = tasks.len(), "starting level");
            let mut pending = Vec::new();

            // Inputs are resolved here, after earlier levels have promoted
            // their outputs.
            for task in tasks {
                let prep_started = Instant::now();
                let outcome = match self.prepare(task, cache, &executed) {
                    Ok(Some(mut p)) => {
                        p.prepared_in = prep_started.elapsed();
                        pending.push(p);
                        continue;
                    }
                    Ok(None) => {
                        info!(task = %task.id, level, "cache hit, skipping");
                        TaskOutcome::Cached
                    }
                    Err(err) => {
                        error!(task = %task.id, level, error = %err, "task preparation failed");
                        TaskOutcome::Failed {
                            message: format!("{:#}", err),
                        }
                    }
                };
                reports.push(TaskReport {
                    id: task.id.clone(),
                    level,
                    outcome,
                    elapsed: prep_started.elapsed(),
                });
            }

            let handles = self.spawn_level(pending, cancel);

            for (task, key, prepared_in, handle) in handles {
                let (result, ran_for, invocation) = match handle.await {
                    Ok(done) => done,
                    Err(join_err) => {
                        error!(task = %task.id, level, error = %join_err, "stage task aborted");
                        reports.push(TaskReport {
                            id: task.id.clone(),
                            level,
                            outcome: TaskOutcome::Failed {
                                message: format!("stage aborted: {join_err}"),
                            },
                            elapsed: prepared_in,
                        });
                        continue;
                    }
                };
                let elapsed = prepared_in + ran_for;

                let outcome = match result {
                    _ if cancel.is_cancelled() => {
                        discard_staging(&invocation.staging_dir);
                        info!(task = %task.id, level, "run cancelled; discarding task output");
                        TaskOutcome::Cancelled
                    }
                    Err(err) => {
                        discard_staging(&invocation.staging_dir);
                        error!(
                            task = %task.id,
                            level,
                            elapsed_ms = elapsed.as_millis() as u64,
                            error = %format!("{:#}", err),
                            "task failed"
                        );
                        TaskOutcome::Failed {
                            message: format!("{:#}", err),
                        }
                    }
                    Ok(written) => match self.promote(&invocation, written, cache) {
                        Ok(outputs) => {
                            let rels: Vec<String> = outputs.keys().cloned().collect();
                            if let Err(err) = cache.record_success(&task.id, key, outputs) {
                                warn!(task = %task.id, error = %err, "failed to persist cache entry");
                            }
                            executed.insert(task.id.clone());
                            info!(
                                task = %task.id,
                                level,
                                elapsed_ms = elapsed.as_millis() as u64,
                                outputs = rels.len(),
                                "task succeeded"
                            );
                            TaskOutcome::Succeeded { outputs: rels }
                        }
                        Err(err) => {
                            discard_staging(&invocation.staging_dir);
                            error!(task = %task.id, level, error = %format!("{:#}", err), "promoting outputs failed");
                            TaskOutcome::Failed {
                                message: format!("{:#}", err),
                            }
                        }
                    },
                };

                reports.push(TaskReport {
                    id: task.id.clone(),
                    level,
                    outcome,
                    elapsed,
                });
            }

            let level_failed = reports
                .iter()
                .any(|r| r.level == level && matches!(r.outcome, TaskOutcome::Failed { .. }));
            if level_failed {
                warn!(level, "level had failures; later levels will not start");
                halted = true;
            }
        }

        // Keep report order equal to execution order within each level.
        let order: Vec<&str> = graph.tasks().map(|t| t.id.as_str()).collect();
        reports.sort_by_key(|r| order.iter().position(|id| *id == r.id));

        let report = BuildReport {
            tasks: reports,
            elapsed: started.elapsed(),
        };
        info!(
            success = report.is_success(),
            ran = report.executed().len(),
            cached = report.cached().len(),
            failed = report.failed().len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "build finished"
        );
        report
    }

    /// Resolve inputs and consult the cache. `Ok(None)` means cache hit.
    fn prepare(
        &mut self,
        task: &Arc<Task>,
        cache: &mut IncrementalCache,
        executed: &HashSet<TaskId>,
    ) -> anyhow::Result<Option<PendingTask>> {
        let mut inputs = self
            .resolver
            .resolve(task.patterns())
            .with_context(|| format!("resolving inputs of task '{}'", task.id))?;

        // A task never depends on what it wrote itself last time.
        if let Some(previous) = cache.entry(&task.id) {
            inputs.retain(|f| !previous.outputs.contains_key(&f.rel));
        }

        let key = CacheKey {
            fingerprint: task.fingerprint().to_string(),
            inputs: inputs.iter().map(|f| (f.rel.clone(), f.hash.clone())).collect(),
            upstream: task
                .after
                .iter()
                .map(|dep| (dep.clone(), cache.output_digest(dep).unwrap_or_default()))
                .collect(),
        };

        let upstream_ran = task.after.iter().any(|dep| executed.contains(dep));
        if !upstream_ran && !cache.should_run(&task.id, &key) {
            return Ok(None);
        }

        let stage = self
            .stages
            .get(&task.id)
            .ok_or_else(|| anyhow!("no stage registered for task '{}'", task.id))?;

        let staging_dir = self.settings.staging_root().join(staging_name(&task.id));
        if staging_dir.exists() {
            std::fs::remove_dir_all(&staging_dir)
                .with_context(|| format!("clearing stale staging directory {:?}", staging_dir))?;
        }
        std::fs::create_dir_all(&staging_dir)
            .with_context(|| format!("creating staging directory {:?}", staging_dir))?;

        debug!(task = %task.id, inputs = inputs.len(), upstream_ran, "task scheduled");
        Ok(Some(PendingTask {
            task: Arc::clone(task),
            key,
            stage,
            invocation: StageInvocation {
                task: Arc::clone(task),
                project_root: self.settings.project_root.clone(),
                output_root: self.settings.output_root.clone(),
                inputs,
                staging_dir,
            },
            prepared_in: Duration::ZERO,
        }))
    }

    fn spawn_level(
        &self,
        pending: Vec<PendingTask>,
        cancel: &CancelToken,
    ) -> Vec<(Arc<Task>, CacheKey, Duration, StageHandle)> {
        let permits = Arc::new(Semaphore::new(self.settings.concurrency));
        let timeout = self.settings.task_timeout;

        pending
            .into_iter()
            .map(|p| {
                let permits = Arc::clone(&permits);
                let cancel = cancel.clone();
                let PendingTask {
                    task,
                    key,
                    stage,
                    invocation,
                    prepared_in,
                } = p;

                let handle = tokio::spawn(async move {
                    // Stages still queued for a permit never start once the
                    // run is cancelled.
                    let _permit = tokio::select! {
                        permit = permits.acquire_owned() => permit,
                        _ = cancel.cancelled() => {
                            return (Err(anyhow!("cancelled before start")), Duration::ZERO, invocation);
                        }
                    };
                    let started = Instant::now();
                    debug!(task = %invocation.task.id, stage = stage.kind(), "stage started");

                    let result = match timeout {
                        Some(limit) => match tokio::time::timeout(limit, stage.run(&invocation)).await {
                            Ok(result) => result,
                            Err(_) => Err(anyhow!("timed out after {:?}", limit)),
                        },
                        None => stage.run(&invocation).await,
                    };
                    (result, started.elapsed(), invocation)
                });

                (task, key, prepared_in, handle)
            })
            .collect()
    }

    /// Move staged files into the task's output directory and hash them.
    ///
    /// Outputs recorded for the previous run that were not produced again
    /// are removed.
    fn promote(
        &mut self,
        inv: &StageInvocation,
        written: Vec<PathBuf>,
        cache: &IncrementalCache,
    ) -> anyhow::Result<BTreeMap<String, String>> {
        let final_dir = inv.final_dir();
        let staged: BTreeSet<PathBuf> = written.into_iter().collect();
        let mut outputs = BTreeMap::new();

        for path in staged {
            let rel = path
                .strip_prefix(&inv.staging_dir)
                .map_err(|_| anyhow!("stage wrote {:?} outside its staging directory", path))?;
            if !path.is_file() {
                bail!("stage reported output {:?} which is not a file", path);
            }

            let dest = final_dir.join(rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating output directory {:?}", parent))?;
            }
            std::fs::rename(&path, &dest)
                .with_context(|| format!("moving {:?} to {:?}", path, dest))?;

            self.resolver.invalidate(&dest);
            let hash = self.resolver.hash_file(&dest)?;
            let key = relative_str(&self.settings.project_root, &dest)
                .ok_or_else(|| anyhow!("output {:?} is outside the project root", dest))?;
            if let Some(owner) = cache.output_owner(&key, &inv.task.id) {
                warn!(
                    task = %inv.task.id,
                    path = %key,
                    owner,
                    "output overwrites a file recorded for another task; that task will rerun next build"
                );
            }
            outputs.insert(key, hash);
        }

        if let Some(previous) = cache.entry(&inv.task.id) {
            for stale in previous.outputs.keys().filter(|k| !outputs.contains_key(*k)) {
                let path = self.settings.project_root.join(stale);
                match std::fs::remove_file(&path) {
                    Ok(()) => debug!(task = %inv.task.id, path = %stale, "removed stale output"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(task = %inv.task.id, path = %stale, error = %e, "failed to remove stale output"),
                }
            }
        }

        discard_staging(&inv.staging_dir);
        Ok(outputs)
    }
}

/// Directory name for a task's staging area.
///
/// The readable part alone is lossy (`js/app` and `js_app` agree), so a
/// short hash of the raw id keeps names distinct.
fn staging_name(id: &str) -> String {
    let readable: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}-{}", readable, &compute_bytes_hash(id.as_bytes())[..12])
}

fn discard_staging(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %dir.display(), error = %e, "failed to remove staging directory");
        }
    }
}

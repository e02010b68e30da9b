use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sitepipe::dag::BuildGraph;
use sitepipe::stage::{Stage, StageFuture, StageInvocation, StageRegistry};

/// One observed stage invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub task: String,
    pub inputs: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Mutex<Vec<RecordedCall>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<Vec<(String, Duration)>>,
    default_delay: Mutex<Option<Duration>>,
}

/// A fake stage that:
/// - records every invocation (task id and input paths)
/// - tracks how many invocations overlapped
/// - writes `<task>.txt` listing its inputs and their hashes
///
/// Clones share state, so one instance can be registered for every task.
#[derive(Debug, Clone, Default)]
pub struct RecordingStage {
    inner: Arc<Inner>,
}

impl RecordingStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every invocation for `task` fail.
    pub fn fail_task(&self, task: &str) -> &Self {
        self.inner.failing.lock().unwrap().insert(task.to_string());
        self
    }

    pub fn clear_failures(&self) {
        self.inner.failing.lock().unwrap().clear();
    }

    /// Sleep this long inside every invocation.
    pub fn with_delay(&self, delay: Duration) -> &Self {
        *self.inner.default_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Sleep this long inside invocations of `task` only.
    pub fn delay_task(&self, task: &str, delay: Duration) -> &Self {
        self.inner
            .delays
            .lock()
            .unwrap()
            .push((task.to_string(), delay));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Task ids in invocation order.
    pub fn executed(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.task).collect()
    }

    pub fn reset(&self) {
        self.inner.calls.lock().unwrap().clear();
        self.inner.max_running.store(0, Ordering::SeqCst);
    }

    /// Highest number of invocations observed running at once.
    pub fn max_concurrency(&self) -> usize {
        self.inner.max_running.load(Ordering::SeqCst)
    }

    /// A registry using this stage for every task in `graph`.
    pub fn registry_for(&self, graph: &BuildGraph) -> StageRegistry {
        let mut registry = StageRegistry::new();
        for task in graph.tasks() {
            registry.insert(task.id.clone(), Arc::new(self.clone()));
        }
        registry
    }

    fn delay_for(&self, task: &str) -> Option<Duration> {
        let per_task = self
            .inner
            .delays
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == task)
            .map(|(_, d)| *d);
        per_task.or(*self.inner.default_delay.lock().unwrap())
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Stage for RecordingStage {
    fn kind(&self) -> &'static str {
        "recording"
    }

    fn run<'a>(&'a self, invocation: &'a StageInvocation) -> StageFuture<'a> {
        Box::pin(async move {
            let task = invocation.task.id.clone();
            self.inner.calls.lock().unwrap().push(RecordedCall {
                task: task.clone(),
                inputs: invocation.inputs.iter().map(|f| f.rel.clone()).collect(),
            });

            let now = self.inner.running.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = RunningGuard(&self.inner.running);
            self.inner.max_running.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay_for(&task) {
                tokio::time::sleep(delay).await;
            }

            if self.inner.failing.lock().unwrap().contains(&task) {
                anyhow::bail!("{task} failed on purpose");
            }

            let mut body = String::new();
            for input in &invocation.inputs {
                body.push_str(&format!("{} {}\n", input.rel, input.hash));
            }
            let path = invocation.staging_dir.join(format!("{task}.txt"));
            tokio::fs::create_dir_all(&invocation.staging_dir).await?;
            tokio::fs::write(&path, body).await?;
            Ok(vec![path])
        })
    }
}

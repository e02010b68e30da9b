// src/stage/mod.rs

//! Transform stages.
//!
//! A stage maps a task's resolved input files to output files. The scheduler
//! never looks inside a stage: it hands over a [`StageInvocation`] and gets
//! back either the list of files written or an error message.
//!
//! - [`copy`] copies inputs verbatim.
//! - [`concat`] bundles inputs into one file.
//! - [`command`] runs an external program through the platform shell.
//! - [`precache`] writes an offline precache manifest.
//!
//! Tests register their own [`Stage`] implementations through
//! [`StageRegistry::insert`].

pub mod command;
pub mod concat;
pub mod copy;
pub mod precache;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::model::StageConfig;
use crate::dag::build_graph::BuildGraph;
use crate::dag::task::{Task, TaskId};
use crate::fileset::FileRecord;

pub use command::CommandStage;
pub use concat::ConcatStage;
pub use copy::CopyStage;
pub use precache::PrecacheStage;

/// Everything a stage gets to see for one run of one task.
#[derive(Debug, Clone)]
pub struct StageInvocation {
    pub task: Arc<Task>,
    pub project_root: PathBuf,
    pub output_root: PathBuf,
    /// Resolved inputs, sorted by project-relative path.
    pub inputs: Vec<FileRecord>,
    /// Empty directory the stage must write into. Its contents are moved to
    /// `output_root/<task.output>` once the stage succeeds.
    pub staging_dir: PathBuf,
}

impl StageInvocation {
    /// Final location a staged file will be promoted to.
    pub fn final_dir(&self) -> PathBuf {
        self.output_root.join(&self.task.output)
    }
}

pub type StageFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<PathBuf>>> + Send + 'a>>;

/// A pluggable transform.
///
/// `run` returns the absolute paths of the files it wrote, all of which must
/// lie inside `invocation.staging_dir`. An `Err` marks the task failed; its
/// message ends up in the build report.
pub trait Stage: Send + Sync + fmt::Debug {
    fn kind(&self) -> &'static str;

    fn run<'a>(&'a self, invocation: &'a StageInvocation) -> StageFuture<'a>;
}

/// Instantiate the built-in stage for a configured variant.
pub fn builtin(config: &StageConfig) -> Arc<dyn Stage> {
    match config {
        StageConfig::Copy { base } => Arc::new(CopyStage::new(base.clone())),
        StageConfig::Concat { file, separator } => {
            Arc::new(ConcatStage::new(file.clone(), separator.clone()))
        }
        StageConfig::Command { cmd, env } => Arc::new(CommandStage::new(cmd.clone(), env.clone())),
        StageConfig::Precache {
            file,
            cache_id,
            strip_prefix,
            handle_fetch,
        } => Arc::new(PrecacheStage::new(
            file.clone(),
            cache_id.clone(),
            strip_prefix.clone(),
            *handle_fetch,
        )),
    }
}

/// Stage lookup by task id.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    stages: HashMap<TaskId, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in stages for every task in `graph`.
    pub fn from_graph(graph: &BuildGraph) -> Self {
        let stages = graph
            .tasks()
            .map(|task| (task.id.clone(), builtin(&task.stage)))
            .collect();
        Self { stages }
    }

    /// Register (or replace) the stage used for `task`.
    pub fn insert(&mut self, task: impl Into<TaskId>, stage: Arc<dyn Stage>) {
        self.stages.insert(task.into(), stage);
    }

    pub fn get(&self, task: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(task).cloned()
    }
}

/// Every regular file below `dir`, sorted.
pub(crate) fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }

    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = std::fs::read_dir(&current)
            .with_context(|| format!("reading directory {:?}", current))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                out.push(path);
            }
        }
    }

    out.sort();
    Ok(out)
}

/// Write `contents` to `path` inside a staging directory, creating parents.
pub(crate) async fn write_staged(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating directory {:?}", parent))?;
    }
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("writing {:?}", path))
}

// src/dag/task.rs

//! Task definitions as seen by the graph and the scheduler.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::cache::hash::compute_bytes_hash;
use crate::config::model::{DefaultSection, StageConfig, TaskConfig};
use crate::errors::{Result, SitepipeError};
use crate::fileset::InputPatterns;

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// One stage invocation within a build graph.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    /// Predecessors in declaration order, without duplicates.
    pub after: Vec<TaskId>,
    pub inputs: Vec<String>,
    pub exclude: Vec<String>,
    /// Output directory relative to the output root.
    pub output: PathBuf,
    pub stage: StageConfig,
    patterns: InputPatterns,
    fingerprint: String,
}

/// Fields that make up a task's configuration fingerprint.
#[derive(Serialize)]
struct FingerprintView<'a> {
    after: &'a [TaskId],
    inputs: &'a [String],
    exclude: &'a [String],
    output: &'a Path,
    stage: &'a StageConfig,
}

impl Task {
    /// Build a task, validating its stage settings and compiling its globs.
    pub fn new(
        id: impl Into<TaskId>,
        after: Vec<TaskId>,
        inputs: Vec<String>,
        exclude: Vec<String>,
        output: impl Into<PathBuf>,
        stage: StageConfig,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SitepipeError::Config("task id must not be empty".to_string()));
        }

        let output = output.into();
        ensure_relative(&id, "output", &output)?;
        validate_stage(&id, &stage)?;

        let patterns = InputPatterns::new(&inputs, &exclude).map_err(|e| {
            SitepipeError::Config(format!("task '{}' has invalid patterns: {:#}", id, e))
        })?;

        let mut deduped: Vec<TaskId> = Vec::with_capacity(after.len());
        for dep in after {
            if !deduped.contains(&dep) {
                deduped.push(dep);
            }
        }

        let view = FingerprintView {
            after: &deduped,
            inputs: &inputs,
            exclude: &exclude,
            output: &output,
            stage: &stage,
        };
        let fingerprint = compute_bytes_hash(&serde_json::to_vec(&view)?);

        Ok(Self {
            id,
            after: deduped,
            inputs,
            exclude,
            output,
            stage,
            patterns,
            fingerprint,
        })
    }

    /// Build a task from its `[[task]]` entry, merging `[default]` excludes.
    pub fn from_config(cfg: &TaskConfig, defaults: &DefaultSection) -> Result<Self> {
        Self::new(
            cfg.id.clone(),
            cfg.after.clone(),
            cfg.inputs.clone(),
            cfg.effective_exclude(defaults),
            PathBuf::from(&cfg.output),
            cfg.stage.clone(),
        )
    }

    pub fn patterns(&self) -> &InputPatterns {
        &self.patterns
    }

    /// Hash of everything that configures this task. A changed fingerprint
    /// invalidates the task's cache entry.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn validate_stage(id: &str, stage: &StageConfig) -> Result<()> {
    let invalid = |msg: &str| {
        Err(SitepipeError::Config(format!(
            "task '{}' ({} stage): {}",
            id,
            stage.kind(),
            msg
        )))
    };

    match stage {
        StageConfig::Copy { base } => {
            if let Some(base) = base {
                ensure_relative(id, "base", Path::new(base))?;
            }
        }
        StageConfig::Concat { file, .. } => {
            if file.trim().is_empty() {
                return invalid("`file` must not be empty");
            }
            ensure_relative(id, "file", Path::new(file))?;
        }
        StageConfig::Command { cmd, .. } => {
            if cmd.trim().is_empty() {
                return invalid("`cmd` must not be empty");
            }
        }
        StageConfig::Precache { file, cache_id, .. } => {
            if file.trim().is_empty() {
                return invalid("`file` must not be empty");
            }
            if cache_id.trim().is_empty() {
                return invalid("`cache_id` must not be empty");
            }
            ensure_relative(id, "file", Path::new(file))?;
        }
    }
    Ok(())
}

fn ensure_relative(id: &str, field: &str, path: &Path) -> Result<()> {
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(SitepipeError::Config(format!(
            "task '{}': `{}` must be a relative path without '..' (got {:?})",
            id, field, path
        )));
    }
    Ok(())
}

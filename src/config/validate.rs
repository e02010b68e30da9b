// src/config/validate.rs

use std::path::{Component, Path};

use crate::config::model::{ConfigFile, ConfigSection, DefaultSection, RawConfigFile, TaskConfig};
use crate::config::settings::check_output_dir;
use crate::dag::{BuildGraph, DependencyGraph, Task};
use crate::errors::{Result, SitepipeError};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SitepipeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

impl ConfigFile {
    /// Build the dependency graph and resolve its levels.
    pub fn build_graph(&self) -> Result<BuildGraph> {
        build_graph(&self.task, &self.default)
    }
}

/// Run every check without consuming the config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(&cfg.config)?;
    validate_publish(cfg)?;
    build_graph(&cfg.task, &cfg.default)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(SitepipeError::Config(
            "config must contain at least one [[task]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(section: &ConfigSection) -> Result<()> {
    if section.concurrency == 0 {
        return Err(SitepipeError::Config(
            "[config].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    if section.debounce_ms == 0 {
        return Err(SitepipeError::Config(
            "[config].debounce_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    check_output_dir("[config].output_dir", &section.output_dir)?;

    if let Some(timeout) = &section.task_timeout {
        parse_duration(timeout)
            .map_err(|e| SitepipeError::Config(format!("[config].task_timeout: {e}")))?;
    }

    Ok(())
}

fn validate_publish(cfg: &RawConfigFile) -> Result<()> {
    let Some(publish) = &cfg.publish else {
        return Ok(());
    };
    if publish.remote.trim().is_empty() {
        return Err(SitepipeError::Config(
            "[publish].remote must not be empty".to_string(),
        ));
    }
    if publish.branch.trim().is_empty() {
        return Err(SitepipeError::Config(
            "[publish].branch must not be empty".to_string(),
        ));
    }
    if Path::new(&publish.dir).components().any(|c| matches!(c, Component::ParentDir | Component::RootDir)) {
        return Err(SitepipeError::Config(format!(
            "[publish].dir must stay inside the output directory (got {:?})",
            publish.dir
        )));
    }
    Ok(())
}

/// Add every task in declaration order, then resolve levels.
///
/// Duplicate ids and cycles are reported by `add_task`, unknown
/// predecessors by `resolve_order`.
fn build_graph(tasks: &[TaskConfig], defaults: &DefaultSection) -> Result<BuildGraph> {
    let mut graph = DependencyGraph::new();
    for cfg in tasks {
        graph.add_task(Task::from_config(cfg, defaults)?)?;
    }
    graph.resolve_order()
}

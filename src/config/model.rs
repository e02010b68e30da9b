// src/config/model.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::CommitPolicy;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// concurrency = 4
/// output_dir = "dist"
///
/// [default]
/// exclude = ["**/.DS_Store"]
///
/// [[task]]
/// id = "styles"
/// inputs = ["app/_assets/scss/**/*.scss"]
/// output = "css"
/// [task.stage]
/// kind = "command"
/// cmd = "sassc $SITEPIPE_INPUTS $SITEPIPE_OUTPUT_DIR/main.css"
///
/// [publish]
/// remote = "git@github.com:org/org.github.io.git"
/// branch = "master"
/// ```
///
/// All sections except `[[task]]` are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// Tasks in declaration order.
    #[serde(default)]
    pub task: Vec<TaskConfig>,

    #[serde(default)]
    pub publish: Option<PublishSection>,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)`, which
/// checks stage settings, glob patterns and the dependency graph.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub default: DefaultSection,
    pub task: Vec<TaskConfig>,
    pub publish: Option<PublishSection>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            default: raw.default,
            task: raw.task,
            publish: raw.publish,
        }
    }

    pub fn tasks(&self) -> &[TaskConfig] {
        &self.task
    }

    pub fn task(&self, id: &str) -> Option<&TaskConfig> {
        self.task.iter().find(|t| t.id == id)
    }
}

/// `[config]` section: global build behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Upper bound on stages running at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Watch-mode debounce window in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Output root, relative to the project root.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Optional per-task timeout, e.g. `"5m"`.
    #[serde(default)]
    pub task_timeout: Option<String>,
}

fn default_concurrency() -> usize {
    4
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_output_dir() -> String {
    "dist".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            debounce_ms: default_debounce_ms(),
            output_dir: default_output_dir(),
            task_timeout: None,
        }
    }
}

/// `[default]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    /// Exclude patterns appended to every task unless it opts out with
    /// `append_default_exclude = false`.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// One `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Unique task identifier.
    pub id: String,

    /// Predecessors: this task starts only after all of them succeeded.
    #[serde(default)]
    pub after: Vec<String>,

    /// Input glob patterns, relative to the project root.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Task-local exclude patterns.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// If true, `default.exclude` is appended to `exclude`.
    #[serde(default = "default_true")]
    pub append_default_exclude: bool,

    /// Output directory relative to the output root (`""` = the root itself).
    #[serde(default)]
    pub output: String,

    pub stage: StageConfig,
}

fn default_true() -> bool {
    true
}

impl TaskConfig {
    /// Effective exclude list after merging `[default].exclude`.
    pub fn effective_exclude(&self, defaults: &DefaultSection) -> Vec<String> {
        let mut combined = self.exclude.clone();
        if self.append_default_exclude {
            combined.extend(defaults.exclude.iter().cloned());
        }
        combined
    }
}

/// Per-stage settings, one variant per built-in stage kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum StageConfig {
    /// Copy inputs into the output directory, keeping paths relative to `base`.
    Copy {
        #[serde(default)]
        base: Option<String>,
    },
    /// Concatenate inputs (sorted by path) into a single file.
    Concat {
        file: String,
        #[serde(default)]
        separator: Option<String>,
    },
    /// Run an external command through the platform shell.
    Command {
        cmd: String,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// Generate an offline precache manifest for the inputs.
    Precache {
        #[serde(default = "default_precache_file")]
        file: String,
        cache_id: String,
        #[serde(default)]
        strip_prefix: String,
        #[serde(default = "default_true")]
        handle_fetch: bool,
    },
}

fn default_precache_file() -> String {
    "service-worker.js".to_string()
}

impl StageConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StageConfig::Copy { .. } => "copy",
            StageConfig::Concat { .. } => "concat",
            StageConfig::Command { .. } => "command",
            StageConfig::Precache { .. } => "precache",
        }
    }
}

/// `[publish]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishSection {
    pub remote: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Directory to publish, relative to the output root.
    #[serde(default)]
    pub dir: String,

    #[serde(default = "default_true")]
    pub commit: bool,

    #[serde(default = "default_true")]
    pub push: bool,

    /// Link local and remote history with a merge when they diverged.
    #[serde(default)]
    pub connect_commits: bool,

    #[serde(default)]
    pub policy: CommitPolicy,

    #[serde(default)]
    pub message: Option<String>,
}

fn default_branch() -> String {
    "gh-pages".to_string()
}

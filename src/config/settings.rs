// src/config/settings.rs

//! Runtime build settings.
//!
//! [`BuildSettings`] is resolved once at startup from the `[config]` section,
//! then environment overrides, then CLI flags, and passed explicitly into the
//! scheduler, the incremental cache and the watch runtime.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::config::model::ConfigSection;
use crate::errors::{Result, SitepipeError};
use crate::types::parse_duration;

pub const ENV_CONCURRENCY: &str = "SITEPIPE_CONCURRENCY";
pub const ENV_DEBOUNCE_MS: &str = "SITEPIPE_DEBOUNCE_MS";
pub const ENV_OUTPUT_DIR: &str = "SITEPIPE_OUTPUT_DIR";
pub const ENV_TASK_TIMEOUT: &str = "SITEPIPE_TASK_TIMEOUT";

/// Name of the state directory kept inside the output root.
pub const STATE_DIR: &str = ".sitepipe";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub project_root: PathBuf,
    /// Absolute output root.
    pub output_root: PathBuf,
    pub concurrency: usize,
    pub debounce: Duration,
    pub task_timeout: Option<Duration>,
}

/// Flags given on the command line; `None` leaves the value untouched.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub concurrency: Option<usize>,
    pub output_dir: Option<String>,
}

impl BuildSettings {
    /// Settings from a validated `[config]` section.
    pub fn from_config(project_root: impl Into<PathBuf>, section: &ConfigSection) -> Result<Self> {
        let project_root = project_root.into();
        let task_timeout = section
            .task_timeout
            .as_deref()
            .map(parse_timeout)
            .transpose()?;

        let settings = Self {
            output_root: project_root.join(&section.output_dir),
            project_root,
            concurrency: section.concurrency,
            debounce: Duration::from_millis(section.debounce_ms),
            task_timeout,
        };
        settings.check()?;
        Ok(settings)
    }

    /// Apply `SITEPIPE_*` overrides read through `lookup`.
    ///
    /// Production code passes `|k| std::env::var(k).ok()`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_CONCURRENCY) {
            self.concurrency = v.trim().parse().map_err(|_| {
                SitepipeError::Config(format!("{ENV_CONCURRENCY} must be a positive integer (got '{v}')"))
            })?;
        }
        if let Some(v) = lookup(ENV_DEBOUNCE_MS) {
            let ms: u64 = v.trim().parse().map_err(|_| {
                SitepipeError::Config(format!("{ENV_DEBOUNCE_MS} must be a number of milliseconds (got '{v}')"))
            })?;
            self.debounce = Duration::from_millis(ms);
        }
        if let Some(v) = lookup(ENV_OUTPUT_DIR) {
            let dir = v.trim();
            check_output_dir(ENV_OUTPUT_DIR, dir)?;
            self.output_root = self.project_root.join(dir);
        }
        if let Some(v) = lookup(ENV_TASK_TIMEOUT) {
            self.task_timeout = Some(parse_timeout(&v)?);
        }
        self.check()?;
        Ok(self)
    }

    pub fn apply_overrides(mut self, overrides: &SettingsOverrides) -> Result<Self> {
        if let Some(n) = overrides.concurrency {
            self.concurrency = n;
        }
        if let Some(dir) = &overrides.output_dir {
            check_output_dir("--output-dir", dir)?;
            self.output_root = self.project_root.join(dir);
        }
        self.check()?;
        Ok(self)
    }

    /// `<output_root>/.sitepipe`
    pub fn state_dir(&self) -> PathBuf {
        self.output_root.join(STATE_DIR)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.state_dir().join("cache.json")
    }

    pub fn staging_root(&self) -> PathBuf {
        self.state_dir().join("staging")
    }

    fn check(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(SitepipeError::Config("concurrency must be >= 1 (got 0)".to_string()));
        }
        if self.debounce.is_zero() {
            return Err(SitepipeError::Config("debounce window must be >= 1ms".to_string()));
        }
        if self.output_root == self.project_root {
            return Err(SitepipeError::Config(
                "output directory must not be the project root".to_string(),
            ));
        }
        Ok(())
    }
}

/// An output directory must stay inside the project root: relative, at least
/// one normal component, no `..`.
pub(crate) fn check_output_dir(source: &str, dir: &str) -> Result<()> {
    let path = Path::new(dir);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    let has_name = path.components().any(|c| matches!(c, Component::Normal(_)));
    if dir.trim().is_empty() || escapes || !has_name {
        return Err(SitepipeError::Config(format!(
            "{source} must be a non-empty relative path without '..' (got {dir:?})"
        )));
    }
    Ok(())
}

fn parse_timeout(s: &str) -> Result<Duration> {
    let d = parse_duration(s).map_err(|e| SitepipeError::Config(format!("invalid task_timeout: {e}")))?;
    if d.is_zero() {
        return Err(SitepipeError::Config("task_timeout must be greater than zero".to_string()));
    }
    Ok(d)
}

// src/fileset/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Compiled input/exclude glob patterns for a single task.
///
/// Patterns are relative to the project root and are matched against
/// forward-slash relative paths such as `"app/_assets/js/main.js"`.
/// `*` does not cross directory boundaries; `**` does.
#[derive(Clone)]
pub struct InputPatterns {
    include: GlobSet,
    exclude: Option<GlobSet>,
    include_count: usize,
}

impl fmt::Debug for InputPatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputPatterns")
            .field("include_count", &self.include_count)
            .field("has_exclude", &self.exclude.is_some())
            .finish()
    }
}

impl InputPatterns {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include_set = build_globset(include).context("building input globset")?;
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };

        Ok(Self {
            include: include_set,
            exclude: exclude_set,
            include_count: include.len(),
        })
    }

    /// A task without input patterns never reads source files directly; it
    /// is driven only by its predecessors.
    pub fn is_empty(&self) -> bool {
        self.include_count == 0
    }

    /// Returns true if `rel_path` is one of this task's inputs.
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.include.is_match(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

// src/fileset/mod.rs

//! File-set resolution.
//!
//! Expands a task's input globs against the project tree into a sorted list
//! of [`FileRecord`]s (path, content hash, modification time). Hashes are
//! memoized per process, so repeated resolutions in watch mode only re-read
//! files whose size or mtime changed.

pub mod patterns;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use tracing::{debug, trace};

use crate::cache::memo::HashMemo;
use crate::fs::FileSystem;

pub use patterns::InputPatterns;

/// Directory names never descended into while resolving.
const SKIPPED_DIR_NAMES: &[&str] = &[".git"];

/// One resolved input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path.
    pub path: PathBuf,
    /// Path relative to the project root, forward slashes.
    pub rel: String,
    pub hash: String,
    pub modified: SystemTime,
}

pub struct FileSetResolver {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    skip: Vec<PathBuf>,
    memo: HashMemo,
}

impl std::fmt::Debug for FileSetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSetResolver")
            .field("root", &self.root)
            .field("skip", &self.skip)
            .field("memoized", &self.memo.len())
            .finish()
    }
}

impl FileSetResolver {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
            skip: Vec::new(),
            memo: HashMemo::new(),
        }
    }

    /// Never descend into `dir` (e.g. the build's own state directory).
    pub fn skip_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skip.push(dir.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Expand `patterns` into the matching files, sorted by relative path.
    pub fn resolve(&mut self, patterns: &InputPatterns) -> Result<Vec<FileRecord>> {
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let mut matched = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            for path in self.fs.read_dir(&dir)? {
                if self.fs.is_dir(&path) {
                    if !self.is_skipped(&path) {
                        stack.push(path);
                    }
                } else if self.fs.is_file(&path) {
                    if let Some(rel) = relative_str(&self.root, &path) {
                        if patterns.matches(&rel) {
                            trace!(path = %rel, "input matched");
                            matched.push((rel, path));
                        }
                    }
                }
            }
        }

        matched.sort();

        let mut records = Vec::with_capacity(matched.len());
        for (rel, path) in matched {
            let (meta, hash) = self.memo.get_or_compute(self.fs.as_ref(), &path)?;
            records.push(FileRecord {
                path,
                rel,
                hash,
                modified: meta.modified,
            });
        }

        debug!(count = records.len(), "resolved file set");
        Ok(records)
    }

    /// Hash a single file through the memo.
    pub fn hash_file(&mut self, path: &Path) -> Result<String> {
        let (_, hash) = self.memo.get_or_compute(self.fs.as_ref(), path)?;
        Ok(hash)
    }

    /// Drop the memoized hash of a path that is known to have changed.
    pub fn invalidate(&mut self, path: &Path) {
        self.memo.invalidate(path);
    }

    fn is_skipped(&self, dir: &Path) -> bool {
        let by_name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| SKIPPED_DIR_NAMES.contains(&n));
        by_name || self.skip.iter().any(|s| s == dir)
    }
}

/// `path` relative to `root` with forward slashes, if it lies under `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}

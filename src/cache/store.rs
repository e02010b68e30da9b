// src/cache/store.rs

//! On-disk incremental cache.
//!
//! One JSON document at `<output_root>/.sitepipe/cache.json`:
//!
//! ```json
//! { "schema_version": 1, "checksum": "<blake3>", "entries": { "<task>": { ... } } }
//! ```
//!
//! The checksum covers the serialized `entries`. Every map is a `BTreeMap`
//! so re-serializing a loaded document reproduces the checksummed bytes.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::hash::{compute_aggregate_hash, compute_bytes_hash};
use crate::cache::memo::HashMemo;
use crate::config::settings::BuildSettings;
use crate::dag::task::TaskId;
use crate::errors::{Result, SitepipeError};
use crate::fs::{FileSystem, RealFileSystem};

/// Bumped whenever the record format changes; older files are discarded.
pub const SCHEMA_VERSION: u32 = 1;

/// What a task saw and produced on its last successful run.
///
/// Paths are relative to the project root with forward slashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub inputs: BTreeMap<String, String>,
    /// Aggregate output hash of each predecessor at the time of the run.
    pub upstream: BTreeMap<TaskId, String>,
    pub outputs: BTreeMap<String, String>,
}

/// The part of a [`CacheEntry`] known before a task runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheKey {
    pub fingerprint: String,
    pub inputs: BTreeMap<String, String>,
    pub upstream: BTreeMap<TaskId, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    schema_version: u32,
    checksum: String,
    entries: BTreeMap<TaskId, CacheEntry>,
}

/// Read first so a future format is recognised before its body is parsed.
#[derive(Debug, Deserialize)]
struct VersionHeader {
    schema_version: u32,
}

pub struct IncrementalCache {
    path: PathBuf,
    project_root: PathBuf,
    entries: BTreeMap<TaskId, CacheEntry>,
    fs: Arc<dyn FileSystem>,
    memo: HashMemo,
}

impl std::fmt::Debug for IncrementalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalCache")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl IncrementalCache {
    /// Load the cache for `settings`, keeping only entries of `known_tasks`.
    ///
    /// Never fails: a missing file or an older schema starts empty, and a
    /// corrupt file is reported at warn level and also starts empty.
    pub fn load<'a, I>(settings: &BuildSettings, known_tasks: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::load_with_fs(settings, known_tasks, Arc::new(RealFileSystem))
    }

    pub fn load_with_fs<'a, I>(settings: &BuildSettings, known_tasks: I, fs: Arc<dyn FileSystem>) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let path = settings.cache_path();
        let mut entries = match read_document(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => BTreeMap::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "discarding incremental cache");
                BTreeMap::new()
            }
        };

        let known: std::collections::HashSet<&str> = known_tasks.into_iter().collect();
        let before = entries.len();
        entries.retain(|task, _| known.contains(task.as_str()));
        if entries.len() != before {
            debug!(pruned = before - entries.len(), "pruned cache entries of removed tasks");
        }

        info!(path = %path.display(), entries = entries.len(), "incremental cache loaded");
        Self {
            path,
            project_root: settings.project_root.clone(),
            entries,
            fs,
            memo: HashMemo::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, task: &str) -> Option<&CacheEntry> {
        self.entries.get(task)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `task` must execute for `key`.
    ///
    /// Returns `false` only when an entry exists with an identical key and
    /// every recorded output is still on disk with its recorded hash.
    pub fn should_run(&mut self, task: &str, key: &CacheKey) -> bool {
        let Some(entry) = self.entries.get(task) else {
            debug!(task, "cache miss: no entry");
            return true;
        };

        if entry.fingerprint != key.fingerprint {
            debug!(task, "cache miss: task configuration changed");
            return true;
        }
        if entry.inputs != key.inputs {
            debug!(task, "cache miss: inputs changed");
            return true;
        }
        if entry.upstream != key.upstream {
            debug!(task, "cache miss: upstream outputs changed");
            return true;
        }

        for (rel, recorded) in &entry.outputs {
            let path = self.project_root.join(rel);
            match self.memo.get_or_compute(self.fs.as_ref(), &path) {
                Ok((_, hash)) if &hash == recorded => {}
                Ok(_) => {
                    debug!(task, path = %rel, "cache miss: output modified");
                    return true;
                }
                Err(_) => {
                    debug!(task, path = %rel, "cache miss: output missing");
                    return true;
                }
            }
        }

        false
    }

    /// Record a successful run and persist the cache atomically.
    pub fn record_success(
        &mut self,
        task: &str,
        key: CacheKey,
        outputs: BTreeMap<String, String>,
    ) -> Result<()> {
        let entry = CacheEntry {
            fingerprint: key.fingerprint,
            inputs: key.inputs,
            upstream: key.upstream,
            outputs,
        };
        self.entries.insert(task.to_string(), entry);
        self.persist()
    }

    /// Another task, not `except`, that last recorded `rel` as an output.
    pub fn output_owner(&self, rel: &str, except: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(task, entry)| task.as_str() != except && entry.outputs.contains_key(rel))
            .map(|(task, _)| task.as_str())
    }

    /// Aggregate hash over the recorded outputs of `task`.
    pub fn output_digest(&self, task: &str) -> Option<String> {
        self.entries.get(task).map(|entry| {
            compute_aggregate_hash(entry.outputs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        })
    }

    /// Write the whole cache to a temp file, sync it, then rename it over the
    /// cache file.
    pub fn persist(&self) -> Result<()> {
        let payload = serde_json::to_vec(&self.entries)?;
        let document = CacheDocument {
            schema_version: SCHEMA_VERSION,
            checksum: compute_bytes_hash(&payload),
            entries: self.entries.clone(),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating cache directory {}", parent.display()))?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("creating temp cache file {}", temp_path.display()))?;

            let mut writer = BufWriter::new(&file);
            serde_json::to_writer(&mut writer, &document)?;
            writer.flush().context("flushing cache file")?;
            drop(writer);
            file.sync_all().context("syncing cache file")?;
        }

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "renaming {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        debug!(path = %self.path.display(), entries = self.entries.len(), "cache persisted");
        Ok(())
    }
}

/// `Ok(None)` for a missing file or an unknown schema version.
fn read_document(path: &Path) -> Result<Option<BTreeMap<TaskId, CacheEntry>>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SitepipeError::CacheCorruption(format!("unreadable: {e}")));
        }
    };

    let header: VersionHeader = serde_json::from_slice(&bytes)
        .map_err(|e| SitepipeError::CacheCorruption(format!("invalid JSON: {e}")))?;
    if header.schema_version != SCHEMA_VERSION {
        info!(
            found = header.schema_version,
            expected = SCHEMA_VERSION,
            "cache schema version changed; starting from an empty cache"
        );
        return Ok(None);
    }

    let document: CacheDocument = serde_json::from_slice(&bytes)
        .map_err(|e| SitepipeError::CacheCorruption(format!("invalid record: {e}")))?;

    let actual = compute_bytes_hash(&serde_json::to_vec(&document.entries)?);
    if actual != document.checksum {
        return Err(SitepipeError::CacheCorruption("checksum mismatch".to_string()));
    }

    Ok(Some(document.entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ConfigSection;

    fn settings(root: &Path) -> BuildSettings {
        BuildSettings::from_config(root, &ConfigSection::default()).unwrap()
    }

    fn key(fp: &str, input_hash: &str) -> CacheKey {
        CacheKey {
            fingerprint: fp.into(),
            inputs: [("src/a.txt".to_string(), input_hash.to_string())].into_iter().collect(),
            upstream: BTreeMap::new(),
        }
    }

    fn write_output(root: &Path, rel: &str, body: &str) -> (String, String) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        (rel.to_string(), compute_bytes_hash(body.as_bytes()))
    }

    #[test]
    fn hit_after_record_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let out = write_output(dir.path(), "dist/a.txt", "A");

        let mut cache = IncrementalCache::load(&s, ["a"]);
        assert!(cache.should_run("a", &key("fp", "h1")));
        cache
            .record_success("a", key("fp", "h1"), [out].into_iter().collect())
            .unwrap();

        let mut reloaded = IncrementalCache::load(&s, ["a"]);
        assert!(!reloaded.should_run("a", &key("fp", "h1")));
        assert!(reloaded.should_run("a", &key("fp", "h2")));
        assert!(reloaded.should_run("a", &key("fp2", "h1")));
        assert!(!s.cache_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn deleted_or_modified_output_forces_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let out = write_output(dir.path(), "dist/a.txt", "A");

        let mut cache = IncrementalCache::load(&s, ["a"]);
        cache
            .record_success("a", key("fp", "h"), [out].into_iter().collect())
            .unwrap();

        fs::write(dir.path().join("dist/a.txt"), "tampered").unwrap();
        assert!(cache.should_run("a", &key("fp", "h")));

        fs::remove_file(dir.path().join("dist/a.txt")).unwrap();
        assert!(cache.should_run("a", &key("fp", "h")));
    }

    #[test]
    fn corrupt_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        fs::create_dir_all(s.state_dir()).unwrap();

        fs::write(s.cache_path(), b"{ not json").unwrap();
        assert!(matches!(read_document(&s.cache_path()), Err(SitepipeError::CacheCorruption(_))));
        assert!(IncrementalCache::load(&s, ["a"]).is_empty());
    }

    #[test]
    fn checksum_mismatch_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let out = write_output(dir.path(), "dist/a.txt", "A");

        let mut cache = IncrementalCache::load(&s, ["a"]);
        cache
            .record_success("a", key("fp", "h"), [out].into_iter().collect())
            .unwrap();

        let text = fs::read_to_string(s.cache_path()).unwrap();
        fs::write(s.cache_path(), text.replace("\"fp\"", "\"forged\"")).unwrap();

        let err = read_document(&s.cache_path()).unwrap_err();
        assert!(matches!(err, SitepipeError::CacheCorruption(ref m) if m.contains("checksum")));
        assert!(IncrementalCache::load(&s, ["a"]).should_run("a", &key("forged", "h")));
    }

    #[test]
    fn other_schema_version_starts_empty_and_removed_tasks_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        fs::create_dir_all(s.state_dir()).unwrap();
        fs::write(s.cache_path(), br#"{"schema_version": 99, "whatever": true}"#).unwrap();
        assert!(read_document(&s.cache_path()).unwrap().is_none());

        let mut cache = IncrementalCache::load(&s, ["a", "b"]);
        cache.record_success("a", key("fp", "h"), BTreeMap::new()).unwrap();
        cache.record_success("b", key("fp", "h"), BTreeMap::new()).unwrap();

        let cache = IncrementalCache::load(&s, ["b"]);
        assert!(cache.entry("a").is_none());
        assert!(cache.entry("b").is_some());
        assert!(cache.output_digest("b").is_some());
    }
}

// src/cache/memo.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::cache::hash::compute_file_hash;
use crate::fs::{FileMeta, FileSystem};

/// In-process memo of file hashes.
///
/// An entry is reused only while the file's size and mtime are unchanged,
/// so a long-running watch session re-hashes only files that were touched.
///
/// On filesystems with coarse mtime resolution, a same-size edit landing in
/// the same tick as the previous hash is not seen until the file changes
/// again. The watch runtime calls [`HashMemo::invalidate`] for paths it gets
/// events for, which covers the common case.
#[derive(Debug, Default)]
pub struct HashMemo {
    hashes: HashMap<PathBuf, (FileMeta, String)>,
}

impl HashMemo {
    pub fn new() -> Self {
        Self {
            hashes: HashMap::new(),
        }
    }

    /// Hash for `path`, computed only if the file changed since last time.
    pub fn get_or_compute(&mut self, fs: &dyn FileSystem, path: &Path) -> Result<(FileMeta, String)> {
        let meta = fs.metadata(path)?;
        if let Some((cached_meta, hash)) = self.hashes.get(path) {
            if *cached_meta == meta {
                return Ok((meta, hash.clone()));
            }
        }

        debug!(path = ?path, "memo miss: computing hash");
        let hash = compute_file_hash(fs, path)?;
        self.hashes.insert(path.to_path_buf(), (meta, hash.clone()));
        Ok((meta, hash))
    }

    pub fn invalidate(&mut self, path: &Path) {
        if self.hashes.remove(path).is_some() {
            debug!(path = ?path, "invalidated memoized hash");
        }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn rewrite_is_detected_through_mtime() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/a.txt", "one");
        let mut memo = HashMemo::new();

        let (_, h1) = memo.get_or_compute(&fs, Path::new("/p/a.txt")).unwrap();
        let (_, again) = memo.get_or_compute(&fs, Path::new("/p/a.txt")).unwrap();
        assert_eq!(h1, again);
        assert_eq!(memo.len(), 1);

        fs.add_file("/p/a.txt", "two");
        let (_, h2) = memo.get_or_compute(&fs, Path::new("/p/a.txt")).unwrap();
        assert_ne!(h1, h2);
    }
}

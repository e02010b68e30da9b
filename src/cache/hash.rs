// src/cache/hash.rs

//! Content hashing (blake3, lowercase hex).

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use blake3::Hasher;

use crate::fs::FileSystem;

/// Compute the hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash an in-memory buffer.
pub fn compute_bytes_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Compute an aggregate hash from `(key, hash)` pairs.
///
/// Pairs must already be sorted by key; both key and hash participate so
/// that renaming a file changes the aggregate.
pub fn compute_aggregate_hash<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut hasher = Hasher::new();
    for (key, hash) in pairs {
        hasher.update(key.as_bytes());
        hasher.update(&[0]);
        hasher.update(hash.as_bytes());
        hasher.update(&[b'\n']);
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn file_hash_tracks_content() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/a.txt", "hello");
        let h1 = compute_file_hash(&fs, Path::new("/p/a.txt")).unwrap();
        assert_eq!(h1, compute_bytes_hash(b"hello"));

        fs.add_file("/p/a.txt", "HELLO");
        let h2 = compute_file_hash(&fs, Path::new("/p/a.txt")).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn aggregate_depends_on_keys_and_hashes() {
        let a = compute_aggregate_hash([("a.txt", "1"), ("b.txt", "2")]);
        let renamed = compute_aggregate_hash([("a.txt", "1"), ("c.txt", "2")]);
        let changed = compute_aggregate_hash([("a.txt", "1"), ("b.txt", "3")]);
        assert_ne!(a, renamed);
        assert_ne!(a, changed);
        assert_eq!(a, compute_aggregate_hash([("a.txt", "1"), ("b.txt", "2")]));
    }
}

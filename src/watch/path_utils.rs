// src/watch/path_utils.rs

//! Path helpers for filesystem events.

use std::path::Path;

/// Convert an event path into a string relative to `root`, with forward
/// slashes.
///
/// Tries a direct prefix strip first. If that fails (symlinked prefixes such
/// as `/private/var` on macOS) both paths are canonicalized and the strip is
/// retried. A deleted file cannot be canonicalized, so its parent is used.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Some(rel) = crate::fileset::relative_str(root, path) {
        return Some(rel);
    }

    let root_canon = root.canonicalize().ok()?;
    if let Ok(path_canon) = path.canonicalize() {
        return crate::fileset::relative_str(&root_canon, &path_canon);
    }

    let parent = path.parent()?.canonicalize().ok()?;
    let name = path.file_name()?;
    crate::fileset::relative_str(&root_canon, &parent.join(name))
}

/// Whether `rel` points into a VCS metadata directory.
pub fn is_vcs_path(rel: &str) -> bool {
    rel == ".git" || rel.starts_with(".git/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_root_prefix() {
        assert_eq!(
            relative_str(Path::new("/site"), Path::new("/site/app/index.html")),
            Some("app/index.html".to_string())
        );
        assert_eq!(relative_str(Path::new("/site"), Path::new("/elsewhere/x")), None);
    }

    #[test]
    fn deleted_file_under_canonical_root_is_relativized() {
        let dir = tempfile::tempdir().unwrap();
        let canon = dir.path().canonicalize().unwrap();
        let gone = canon.join("removed.txt");
        assert_eq!(relative_str(dir.path(), &gone), Some("removed.txt".to_string()));
    }

    #[test]
    fn detects_git_paths() {
        assert!(is_vcs_path(".git/index"));
        assert!(!is_vcs_path(".github/workflows/ci.yml"));
    }
}

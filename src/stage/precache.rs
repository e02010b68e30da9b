// src/stage/precache.rs

//! Offline precache manifest generator.
//!
//! Emits one `{ url, revision }` entry per input, sorted by url. A service
//! worker loads the manifest and pre-fetches every listed url, using the
//! revision to decide when a cached copy is stale.

use anyhow::Result;
use serde::Serialize;

use super::{Stage, StageFuture, StageInvocation, write_staged};
use crate::fileset::{FileRecord, relative_str};

#[derive(Debug, Clone)]
pub struct PrecacheStage {
    file: String,
    cache_id: String,
    strip_prefix: String,
    handle_fetch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PrecacheEntry {
    pub url: String,
    pub revision: String,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    cache_id: &'a str,
    handle_fetch: bool,
    entries: Vec<PrecacheEntry>,
}

impl PrecacheStage {
    pub fn new(file: String, cache_id: String, strip_prefix: String, handle_fetch: bool) -> Self {
        Self {
            file,
            cache_id,
            strip_prefix,
            handle_fetch,
        }
    }

    /// Entries for `inputs`, urls relative to the output root when the input
    /// lives there and to the project root otherwise.
    pub fn entries(&self, inv: &StageInvocation) -> Vec<PrecacheEntry> {
        let mut entries: Vec<PrecacheEntry> = inv
            .inputs
            .iter()
            .map(|input| PrecacheEntry {
                url: self.url_for(inv, input),
                revision: input.hash.clone(),
            })
            .collect();
        entries.sort();
        entries
    }

    fn url_for(&self, inv: &StageInvocation, input: &FileRecord) -> String {
        let rel = relative_str(&inv.output_root, &input.path).unwrap_or_else(|| input.rel.clone());
        let trimmed = strip_leading_segments(&rel, &self.strip_prefix).trim_start_matches('/');
        format!("/{}", trimmed)
    }

    fn render(&self, entries: Vec<PrecacheEntry>) -> Result<String> {
        let manifest = Manifest {
            cache_id: &self.cache_id,
            handle_fetch: self.handle_fetch,
            entries,
        };
        if self.file.ends_with(".js") {
            Ok(format!("self.__precache = {};\n", serde_json::to_string(&manifest)?))
        } else {
            Ok(serde_json::to_string_pretty(&manifest)? + "\n")
        }
    }
}

/// Remove `prefix` from `rel` only when it ends on a `/` boundary.
fn strip_leading_segments<'a>(rel: &'a str, prefix: &str) -> &'a str {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        return rel;
    }
    match rel.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => rel,
    }
}

impl Stage for PrecacheStage {
    fn kind(&self) -> &'static str {
        "precache"
    }

    fn run<'a>(&'a self, inv: &'a StageInvocation) -> StageFuture<'a> {
        Box::pin(async move {
            let entries = self.entries(inv);
            let body = self.render(entries)?;
            let dest = inv.staging_dir.join(&self.file);
            write_staged(&dest, body).await?;
            Ok(vec![dest])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::StageConfig;
    use crate::dag::task::Task;
    use crate::stage::test_support::invocation;

    fn setup(file: &str) -> (tempfile::TempDir, StageInvocation, PrecacheStage) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("dist/css")).unwrap();
        std::fs::write(root.join("dist/index.html"), "<html>").unwrap();
        std::fs::write(root.join("dist/css/main.css"), "body{}").unwrap();

        let cfg = StageConfig::Precache {
            file: file.into(),
            cache_id: "site".into(),
            strip_prefix: "".into(),
            handle_fetch: true,
        };
        let task = Task::new("sw", vec![], vec!["dist/**".into()], vec![], "", cfg).unwrap();
        let inv = invocation(root, task, &["dist/index.html", "dist/css/main.css"]);
        let stage = PrecacheStage::new(file.into(), "site".into(), "".into(), true);
        (dir, inv, stage)
    }

    #[test]
    fn entries_are_sorted_and_relative_to_output_root() {
        let (_dir, inv, stage) = setup("sw.json");
        let entries = stage.entries(&inv);
        let urls: Vec<_> = entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["/css/main.css", "/index.html"]);
        assert_eq!(entries[1].revision, inv.inputs[0].hash);
    }

    #[test]
    fn strip_prefix_is_removed_from_urls() {
        let (_dir, inv, _) = setup("sw.json");
        let stage = PrecacheStage::new("sw.json".into(), "site".into(), "css".into(), true);
        let urls: Vec<_> = stage.entries(&inv).into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["/index.html", "/main.css"]);
    }

    #[test]
    fn strip_prefix_only_matches_whole_segments() {
        let (_dir, inv, _) = setup("sw.json");
        let stage = PrecacheStage::new("sw.json".into(), "site".into(), "c".into(), true);
        let urls: Vec<_> = stage.entries(&inv).into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["/css/main.css", "/index.html"]);

        assert_eq!(strip_leading_segments("css/main.css", "css/"), "/main.css");
        assert_eq!(strip_leading_segments("cssx/main.css", "css"), "cssx/main.css");
    }

    #[tokio::test]
    async fn js_manifest_is_assigned_to_global() {
        let (_dir, inv, stage) = setup("service-worker.js");
        let written = stage.run(&inv).await.unwrap();
        let body = std::fs::read_to_string(&written[0]).unwrap();
        assert!(body.starts_with("self.__precache = {\"cache_id\":\"site\""), "{body}");
        assert!(body.trim_end().ends_with(';'));
    }

    #[tokio::test]
    async fn json_manifest_is_pretty_printed() {
        let (_dir, inv, stage) = setup("precache.json");
        let written = stage.run(&inv).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(value["entries"].as_array().unwrap().len(), 2);
        assert_eq!(value["handle_fetch"], true);
    }
}

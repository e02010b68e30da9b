// src/watch/debounce.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::engine::{RuntimeMessage, WatchEvent};
use crate::watch::path_utils::{is_vcs_path, relative_str};

/// Wait for the first path, then keep collecting until the channel has been
/// quiet for `window`.
///
/// Returns `None` once the channel is closed and drained.
pub async fn collect_batch(
    rx: &mut mpsc::UnboundedReceiver<PathBuf>,
    window: Duration,
) -> Option<Vec<PathBuf>> {
    let first = rx.recv().await?;
    let mut batch = vec![first];

    loop {
        match tokio::time::timeout(window, rx.recv()).await {
            Ok(Some(path)) => batch.push(path),
            Ok(None) | Err(_) => break,
        }
    }

    Some(batch)
}

/// Paths relative to `root`, minus anything under `ignore_dir` or in VCS
/// metadata. Sorted and deduplicated.
pub fn relevant_paths(root: &Path, ignore_dir: &Path, batch: Vec<PathBuf>) -> Vec<String> {
    let ignored_rel = relative_str(root, ignore_dir);
    let mut out = BTreeSet::new();

    for path in batch {
        if path.starts_with(ignore_dir) {
            continue;
        }
        let Some(rel) = relative_str(root, &path) else {
            trace!(path = %path.display(), "event outside project root");
            continue;
        };
        if rel.is_empty() || is_vcs_path(&rel) {
            continue;
        }
        if let Some(ignored) = &ignored_rel {
            if rel == *ignored || rel.starts_with(&format!("{ignored}/")) {
                continue;
            }
        }
        out.insert(rel);
    }

    out.into_iter().collect()
}

/// Spawn the task turning raw watcher paths into debounced
/// [`WatchEvent::FilesChanged`] batches.
///
/// Changes under `output_root` (including the cache directory) are dropped
/// so a build never retriggers itself.
pub fn spawn_debouncer(
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    root: PathBuf,
    output_root: PathBuf,
    window: Duration,
    tx: mpsc::Sender<RuntimeMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(batch) = collect_batch(&mut rx, window).await {
            let raw = batch.len();
            let paths = relevant_paths(&root, &output_root, batch);
            if paths.is_empty() {
                trace!(raw, "debounced batch had no relevant paths");
                continue;
            }

            debug!(raw, changed = paths.len(), "debounced change batch");
            if tx
                .send(RuntimeMessage::Event(WatchEvent::FilesChanged(paths)))
                .await
                .is_err()
            {
                break;
            }
        }
        debug!("debouncer finished");
    })
}

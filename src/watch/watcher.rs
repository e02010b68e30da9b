// src/watch/watcher.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::info;

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops file watching and closes the path channel.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
    root: PathBuf,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").field("root", &self.root).finish()
    }
}

impl WatcherHandle {
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

/// Watch `root` recursively and forward every changed path onto an
/// unbounded channel.
///
/// The notify callback runs on notify's own thread and only pushes paths;
/// debouncing and matching happen on the async side.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
) -> Result<(WatcherHandle, mpsc::UnboundedReceiver<PathBuf>)> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    let (path_tx, path_rx) = mpsc::unbounded_channel::<PathBuf>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                for path in event.paths {
                    if path_tx.send(path).is_err() {
                        // Receiver gone: the controller is shutting down.
                        return;
                    }
                }
            }
            Err(err) => {
                eprintln!("sitepipe: file watch error: {err}");
            }
        },
        Config::default(),
    )
    .context("creating filesystem watcher")?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {:?}", root))?;

    info!(root = %root.display(), "file watcher started");

    Ok((
        WatcherHandle {
            _inner: watcher,
            root,
        },
        path_rx,
    ))
}

// src/watch/mod.rs

//! File watching and change detection.
//!
//! - [`watcher`] wires `notify` to an unbounded channel of raw paths.
//! - [`debounce`] coalesces bursts into one `FilesChanged` event.
//! - [`affected`] maps changed paths to the task subgraph to rebuild.
//! - [`path_utils`] relativizes event paths against the project root.
//!
//! Nothing here runs tasks; the engine decides what to do with a batch.

pub mod affected;
pub mod debounce;
pub mod path_utils;
pub mod watcher;

pub use affected::affected_tasks;
pub use debounce::{collect_batch, spawn_debouncer};
pub use watcher::{WatcherHandle, spawn_watcher};

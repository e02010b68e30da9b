// src/engine/mod.rs

//! Watch controller.
//!
//! The pure core state machine lives in [`core`] (with its handlers in
//! [`event_handlers`]); the async IO shell that owns the scheduler, the
//! incremental cache and the event channel is [`runtime`].

/// Identifier of one scheduler run within a watch session.
pub type RunId = u64;

/// Events consumed by the watch core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Debounced batch of changed paths, relative to the project root.
    FilesChanged(Vec<String>),
    /// The run with this id finished, failed or was cancelled.
    RunFinished { run_id: RunId },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use self::core::WatchCore;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::{RuntimeMessage, WatchRuntime};

// src/dag/mod.rs

//! Task graph and scheduling.
//!
//! - [`task`] defines [`Task`] and its configuration fingerprint.
//! - [`graph`] holds the [`DependencyGraph`] (cycle, duplicate and unknown
//!   dependency detection).
//! - [`build_graph`] is the resolved, level-partitioned [`BuildGraph`].
//! - [`scheduler`] executes a build graph level by level.
//! - [`report`] collects per-task outcomes into a [`BuildReport`].
//! - [`cancel`] provides the cooperative [`CancelToken`].

pub mod build_graph;
pub mod cancel;
pub mod graph;
pub mod report;
pub mod scheduler;
pub mod task;

pub use build_graph::BuildGraph;
pub use cancel::CancelToken;
pub use graph::DependencyGraph;
pub use report::{BuildReport, TaskOutcome, TaskReport};
pub use scheduler::Scheduler;
pub use task::{Task, TaskId};

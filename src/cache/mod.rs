// src/cache/mod.rs

//! Incremental cache.
//!
//! - [`hash`] computes blake3 content hashes.
//! - [`memo`] memoizes file hashes per process, keyed by size and mtime.
//! - [`store`] persists per-task [`CacheEntry`] records and answers
//!   `should_run` / `record_success`.

pub mod hash;
pub mod memo;
pub mod store;

pub use store::{CacheEntry, CacheKey, IncrementalCache, SCHEMA_VERSION};

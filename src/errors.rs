// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SitepipeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Duplicate task id: '{0}'")]
    DuplicateTask(String),

    #[error("Cycle detected: task '{task}' would depend on itself via '{via}'")]
    Cycle { task: String, via: String },

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Task '{task}' failed: {message}")]
    StageExecution { task: String, message: String },

    #[error("Cache corrupted: {0}")]
    CacheCorruption(String),

    #[error(
        "Publish conflict: remote {remote} branch '{branch}' has diverged \
         (local {local_ref}, remote {remote_ref}); enable connect_commits to link histories"
    )]
    PublishConflict {
        remote: String,
        branch: String,
        local_ref: String,
        remote_ref: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SitepipeError {
    /// Errors that are reported before any task executes.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SitepipeError::Config(_)
                | SitepipeError::DuplicateTask(_)
                | SitepipeError::Cycle { .. }
                | SitepipeError::UnknownDependency { .. }
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SitepipeError>;

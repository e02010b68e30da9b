// src/config/mod.rs

//! Configuration loading and validation for sitepipe.
//!
//! - `model.rs` defines the TOML-backed data model.
//! - `loader.rs` reads a config file from disk.
//! - `validate.rs` checks invariants and builds the task graph.
//! - `settings.rs` resolves [`BuildSettings`] with env and CLI overrides.

pub mod loader;
pub mod model;
pub mod settings;
pub mod validate;

pub use loader::{DEFAULT_CONFIG_FILE, load_and_validate, load_from_path, project_root_for};
pub use model::{
    ConfigFile, ConfigSection, DefaultSection, PublishSection, RawConfigFile, StageConfig, TaskConfig,
};
pub use settings::{BuildSettings, SettingsOverrides};
pub use validate::validate_config;

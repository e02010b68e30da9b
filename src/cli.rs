// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::loader::DEFAULT_CONFIG_FILE;
use crate::config::settings::SettingsOverrides;

/// Command-line arguments for `sitepipe`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sitepipe",
    version,
    about = "Build a static site from a declarative task graph, incrementally.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// The project root is the directory containing it.
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SITEPIPE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Maximum number of stages running at once.
    #[arg(long, global = true, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Output root, relative to the project root.
    #[arg(long, global = true, value_name = "DIR")]
    pub output_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the full task graph once.
    Build {
        /// Validate the config and print the resolved levels without
        /// running anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Build once, then rebuild affected tasks whenever sources change.
    #[command(alias = "serve")]
    Watch,
    /// Build, then publish the output directory via `[publish]`.
    Deploy,
}

impl CliArgs {
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            concurrency: self.concurrency,
            output_dir: self.output_dir.clone(),
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

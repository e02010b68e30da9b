// src/publish/git.rs

//! Git invocation seam.
//!
//! The publisher talks to git through [`GitCommand`] so tests can script
//! responses instead of spawning processes.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::trace;

/// Captured result of one git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    /// Exit code; `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub type GitFuture<'a> = Pin<Box<dyn Future<Output = Result<GitOutput>> + Send + 'a>>;

/// Runs `git <args>` in `dir`.
///
/// A non-zero exit is returned as a [`GitOutput`], not an error; only a
/// failure to run git at all is an `Err`.
pub trait GitCommand: Send + Sync + fmt::Debug {
    fn run<'a>(&'a self, dir: &'a Path, args: &'a [String]) -> GitFuture<'a>;
}

/// Spawns the `git` binary found on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct SystemGit;

impl GitCommand for SystemGit {
    fn run<'a>(&'a self, dir: &'a Path, args: &'a [String]) -> GitFuture<'a> {
        Box::pin(async move {
            trace!(dir = %dir.display(), ?args, "git");
            let output = Command::new("git")
                .args(args)
                .current_dir(dir)
                .kill_on_drop(true)
                .output()
                .await
                .with_context(|| format!("running git {}", args.join(" ")))?;

            Ok(GitOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

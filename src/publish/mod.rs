// src/publish/mod.rs

//! Publish adapter: commits a finished output directory to a hosting branch
//! and pushes it.
//!
//! The output directory gets its own git repository. When the remote
//! branch already exists and its tip is not an ancestor of the local
//! `HEAD`, the histories have diverged: with `connect_commits` they are
//! linked by an `ours` merge (local tree wins), otherwise the caller gets a
//! [`SitepipeError::PublishConflict`]. No other merge resolution is tried.

pub mod git;

use std::path::PathBuf;

use anyhow::anyhow;
use tracing::{debug, info};

use crate::config::model::PublishSection;
use crate::config::settings::{BuildSettings, STATE_DIR};
use crate::errors::{Result, SitepipeError};
use crate::types::CommitPolicy;

pub use git::{GitCommand, GitOutput, SystemGit};

const DEFAULT_MESSAGE: &str = "Site build";

/// Where and how to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub remote: String,
    pub branch: String,
    /// Absolute directory to publish.
    pub dir: PathBuf,
    pub commit: bool,
    pub push: bool,
    pub connect_commits: bool,
    pub policy: CommitPolicy,
    pub message: String,
}

impl PublishTarget {
    pub fn from_section(section: &PublishSection, settings: &BuildSettings) -> Self {
        Self {
            remote: section.remote.clone(),
            branch: section.branch.clone(),
            dir: settings.output_root.join(&section.dir),
            commit: section.commit,
            push: section.push,
            connect_commits: section.connect_commits,
            policy: section.policy,
            message: section
                .message
                .clone()
                .unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub committed: bool,
    pub pushed: bool,
    /// `HEAD` of the publish repository afterwards, if it has one.
    pub commit: Option<String>,
}

#[derive(Debug)]
pub struct GitPublisher<G: GitCommand> {
    git: G,
    target: PublishTarget,
}

impl<G: GitCommand> GitPublisher<G> {
    pub fn new(git: G, target: PublishTarget) -> Self {
        Self { git, target }
    }

    pub fn target(&self) -> &PublishTarget {
        &self.target
    }

    pub async fn publish(&self) -> Result<PublishOutcome> {
        let t = &self.target;
        if !t.dir.is_dir() {
            return Err(SitepipeError::Config(format!(
                "publish directory {} does not exist; run a build first",
                t.dir.display()
            )));
        }

        info!(dir = %t.dir.display(), remote = %t.remote, branch = %t.branch, "publishing");
        self.ensure_repository().await?;

        let committed = if t.commit { self.commit().await? } else { false };

        let pushed = if t.push {
            if self.head().await?.is_none() {
                return Err(anyhow!("nothing to push: {} has no commits", t.dir.display()).into());
            }
            self.reconcile_remote().await?;
            self.git_ok(&["push", &t.remote, &format!("HEAD:{}", t.branch)]).await?;
            info!(remote = %t.remote, branch = %t.branch, "pushed");
            true
        } else {
            false
        };

        Ok(PublishOutcome {
            committed,
            pushed,
            commit: self.head().await?,
        })
    }

    async fn ensure_repository(&self) -> Result<()> {
        if !self.target.dir.join(".git").exists() {
            debug!(dir = %self.target.dir.display(), "initialising publish repository");
            self.git_ok(&["init"]).await?;
        }
        self.git_ok(&["checkout", "-B", &self.target.branch]).await?;
        Ok(())
    }

    /// Stage everything except the build state directory and commit
    /// according to the commit policy. Returns whether a commit was made.
    async fn commit(&self) -> Result<bool> {
        let t = &self.target;
        self.git_ok(&["add", "-A", "--", ".", &format!(":!{}", STATE_DIR)]).await?;

        let unchanged = self.git(&["diff", "--cached", "--quiet"]).await?.success();
        if unchanged && t.policy == CommitPolicy::OnlyOnChange {
            info!("publish directory unchanged; skipping commit");
            return Ok(false);
        }

        let mut args = vec!["commit", "-m", t.message.as_str()];
        if t.policy == CommitPolicy::Always {
            args.push("--allow-empty");
        }
        self.git_ok(&args).await?;
        info!(policy = ?t.policy, "committed build output");
        Ok(true)
    }

    /// Make sure pushing `HEAD` will not discard remote history.
    async fn reconcile_remote(&self) -> Result<()> {
        let t = &self.target;
        let heads = self.git_ok(&["ls-remote", "--heads", &t.remote, &t.branch]).await?;
        if heads.stdout.trim().is_empty() {
            debug!(branch = %t.branch, "remote branch does not exist yet");
            return Ok(());
        }

        self.git_ok(&["fetch", &t.remote, &t.branch]).await?;
        let ancestry = self
            .git(&["merge-base", "--is-ancestor", "FETCH_HEAD", "HEAD"])
            .await?;
        match ancestry.code {
            Some(0) => return Ok(()),
            Some(1) => {}
            _ => {
                return Err(anyhow!("git merge-base failed: {}", ancestry.stderr.trim()).into());
            }
        }

        if t.connect_commits {
            info!(branch = %t.branch, "linking local and remote history");
            self.git_ok(&[
                "merge",
                "-s",
                "ours",
                "--allow-unrelated-histories",
                "-m",
                &t.message,
                "FETCH_HEAD",
            ])
            .await?;
            return Ok(());
        }

        let local_ref = self.rev_parse("HEAD").await?.unwrap_or_default();
        let remote_ref = self.rev_parse("FETCH_HEAD").await?.unwrap_or_default();
        Err(SitepipeError::PublishConflict {
            remote: t.remote.clone(),
            branch: t.branch.clone(),
            local_ref,
            remote_ref,
        })
    }

    async fn head(&self) -> Result<Option<String>> {
        self.rev_parse("HEAD").await
    }

    async fn rev_parse(&self, rev: &str) -> Result<Option<String>> {
        let out = self.git(&["rev-parse", "--verify", "--quiet", rev]).await?;
        Ok(out
            .success()
            .then(|| out.stdout.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    async fn git(&self, args: &[&str]) -> Result<GitOutput> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let out = self.git.run(&self.target.dir, &args).await?;
        debug!(args = %args.join(" "), code = ?out.code, "git finished");
        Ok(out)
    }

    async fn git_ok(&self, args: &[&str]) -> Result<GitOutput> {
        let out = self.git(args).await?;
        if !out.success() {
            return Err(anyhow!(
                "git {} failed ({:?}): {}",
                args.join(" "),
                out.code,
                out.stderr.trim()
            )
            .into());
        }
        Ok(out)
    }
}

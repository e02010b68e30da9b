// src/stage/command.rs

//! External command stage.
//!
//! Runs `cmd` through the platform shell with the task's inputs and staging
//! directory passed in environment variables. Everything the command leaves
//! in the staging directory counts as output.

use std::collections::{BTreeMap, VecDeque};
use std::process::Stdio;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::{Stage, StageFuture, StageInvocation, collect_files};

/// Newline-separated absolute input paths.
pub const ENV_INPUTS: &str = "SITEPIPE_INPUTS";
/// Staging directory the command must write into.
pub const ENV_OUTPUT_DIR: &str = "SITEPIPE_OUTPUT_DIR";
pub const ENV_PROJECT_ROOT: &str = "SITEPIPE_PROJECT_ROOT";

/// Number of trailing stderr lines kept for the failure message.
const STDERR_TAIL: usize = 20;

#[derive(Debug, Clone)]
pub struct CommandStage {
    cmd: String,
    env: BTreeMap<String, String>,
}

impl CommandStage {
    pub fn new(cmd: String, env: BTreeMap<String, String>) -> Self {
        Self { cmd, env }
    }

    fn shell_command(&self) -> Command {
        if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        }
    }
}

impl Stage for CommandStage {
    fn kind(&self) -> &'static str {
        "command"
    }

    fn run<'a>(&'a self, inv: &'a StageInvocation) -> StageFuture<'a> {
        Box::pin(async move {
            let task = &inv.task.id;
            info!(task = %task, cmd = %self.cmd, "starting stage process");

            tokio::fs::create_dir_all(&inv.staging_dir)
                .await
                .with_context(|| format!("creating staging directory {:?}", inv.staging_dir))?;

            let inputs = inv
                .inputs
                .iter()
                .map(|f| f.path.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("\n");

            let mut cmd = self.shell_command();
            cmd.current_dir(&inv.project_root)
                .env(ENV_INPUTS, inputs)
                .env(ENV_OUTPUT_DIR, &inv.staging_dir)
                .env(ENV_PROJECT_ROOT, &inv.project_root)
                .envs(&self.env)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = cmd
                .spawn()
                .with_context(|| format!("spawning process for task '{}'", task))?;

            if let Some(stdout) = child.stdout.take() {
                let task = task.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        info!(task = %task, "{}", line);
                    }
                });
            }

            // Consume stderr so the pipe never fills; keep the tail for errors.
            let stderr_tail = child.stderr.take().map(|stderr| {
                let task = task.clone();
                tokio::spawn(async move {
                    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(task = %task, "stderr: {}", line);
                        if tail.len() == STDERR_TAIL {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    tail.into_iter().collect::<Vec<_>>().join("\n")
                })
            });

            let status = child
                .wait()
                .await
                .with_context(|| format!("waiting for process of task '{}'", task))?;

            let code = status.code().unwrap_or(-1);
            info!(task = %task, exit_code = code, success = status.success(), "stage process exited");

            if !status.success() {
                let tail = match stderr_tail {
                    Some(handle) => handle.await.unwrap_or_default(),
                    None => String::new(),
                };
                if tail.is_empty() {
                    bail!("command exited with status {}", code);
                }
                bail!("command exited with status {}:\n{}", code, tail);
            }

            collect_files(&inv.staging_dir)
        })
    }
}

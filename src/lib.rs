// src/lib.rs

pub mod cache;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod fileset;
pub mod fs;
pub mod logging;
pub mod publish;
pub mod stage;
pub mod types;
pub mod watch;

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::cache::IncrementalCache;
use crate::cli::{CliArgs, Command};
use crate::config::loader::{load_and_validate, project_root_for};
use crate::config::settings::BuildSettings;
use crate::dag::{BuildGraph, BuildReport, CancelToken, Scheduler};
use crate::engine::runtime::spawn_ctrl_c_listener;
use crate::engine::{WatchCore, WatchRuntime};
use crate::errors::{Result, SitepipeError};
use crate::publish::{GitPublisher, PublishTarget, SystemGit};
use crate::stage::StageRegistry;

/// Aggregate result of a CLI invocation that did not error out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    TasksFailed,
}

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config (every configuration error is reported
/// here, before anything runs), resolves [`BuildSettings`], then dispatches
/// on the subcommand.
pub async fn run(args: CliArgs) -> Result<RunStatus> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let root = project_root_for(&config_path);
    let root = root.canonicalize().unwrap_or(root);
    let settings = BuildSettings::from_config(root, &cfg.config)?
        .apply_env(|key| std::env::var(key).ok())?
        .apply_overrides(&args.overrides())?;
    debug!(?settings, "build settings resolved");

    let graph = cfg.build_graph()?;

    match args.command {
        Command::Build { dry_run: true } => {
            print_dry_run(&graph, &settings);
            Ok(RunStatus::Success)
        }
        Command::Build { dry_run: false } => {
            let report = build_once(&settings, &graph, StageRegistry::from_graph(&graph)).await;
            println!("{report}");
            Ok(status_of(&report))
        }
        Command::Watch => {
            watch_session(settings, graph).await?;
            Ok(RunStatus::Success)
        }
        Command::Deploy => {
            let Some(section) = cfg.publish.as_ref() else {
                return Err(SitepipeError::Config(
                    "deploy requires a [publish] section".to_string(),
                ));
            };

            let report = build_once(&settings, &graph, StageRegistry::from_graph(&graph)).await;
            println!("{report}");
            if !report.is_success() {
                for err in report.errors() {
                    warn!("{err}");
                }
                warn!("build failed; nothing published");
                return Ok(RunStatus::TasksFailed);
            }

            let target = PublishTarget::from_section(section, &settings);
            let outcome = GitPublisher::new(SystemGit, target).publish().await?;
            println!(
                "published: committed={} pushed={} commit={}",
                outcome.committed,
                outcome.pushed,
                outcome.commit.as_deref().unwrap_or("-")
            );
            Ok(RunStatus::Success)
        }
    }
}

/// Run `graph` once against the on-disk cache.
pub async fn build_once(settings: &BuildSettings, graph: &BuildGraph, stages: StageRegistry) -> BuildReport {
    let mut cache = IncrementalCache::load(settings, graph.graph().task_ids());
    let mut scheduler = Scheduler::new(settings.clone(), stages);
    scheduler.execute(graph, &mut cache, &CancelToken::new()).await
}

/// Initial build, then rebuild affected subgraphs until Ctrl-C.
async fn watch_session(settings: BuildSettings, graph: BuildGraph) -> Result<()> {
    let (watcher, paths) = watch::spawn_watcher(&settings.project_root)?;

    let cache = IncrementalCache::load(&settings, graph.graph().task_ids());
    let scheduler = Scheduler::new(settings.clone(), StageRegistry::from_graph(&graph));
    let runtime = WatchRuntime::new(WatchCore::new(graph), scheduler, cache);

    // The watcher canonicalizes its root; relativize against the same path.
    let root = watcher.root().to_path_buf();
    let output_root = root.join(
        settings
            .output_root
            .strip_prefix(&settings.project_root)
            .unwrap_or(&settings.output_root),
    );
    let _debouncer = watch::spawn_debouncer(paths, root, output_root, settings.debounce, runtime.sender());
    spawn_ctrl_c_listener(runtime.sender());

    let reports = runtime.run().await?;
    info!(runs = reports.len(), "watch session ended");
    drop(watcher);
    Ok(())
}

fn status_of(report: &BuildReport) -> RunStatus {
    if report.is_success() {
        RunStatus::Success
    } else {
        RunStatus::TasksFailed
    }
}

/// Print tasks, stage kinds and resolved levels without executing.
fn print_dry_run(graph: &BuildGraph, settings: &BuildSettings) {
    println!("sitepipe dry-run");
    println!("  project root = {}", settings.project_root.display());
    println!("  output root  = {}", settings.output_root.display());
    println!("  concurrency  = {}", settings.concurrency);
    if let Some(timeout) = settings.task_timeout {
        println!("  task timeout = {:?}", timeout);
    }
    println!();

    for (level, tasks) in graph.levels().iter().enumerate() {
        println!("level {level}:");
        for task in tasks {
            println!("  - {} ({})", task.id, task.stage.kind());
            if !task.after.is_empty() {
                println!("      after: {:?}", task.after);
            }
            if !task.inputs.is_empty() {
                println!("      inputs: {:?}", task.inputs);
            }
            if !task.exclude.is_empty() {
                println!("      exclude: {:?}", task.exclude);
            }
            println!("      output: {}", settings.output_root.join(&task.output).display());
        }
    }

    debug!("dry-run complete (no execution)");
}

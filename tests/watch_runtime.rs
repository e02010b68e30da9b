mod common;
use crate::common::builders::{ConfigFileBuilder, TaskConfigBuilder};
use crate::common::{Project, RecordingStage, TestResult, init_tracing};

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use sitepipe::cache::IncrementalCache;
use sitepipe::dag::{BuildGraph, BuildReport, Scheduler, TaskOutcome};
use sitepipe::engine::{RunId, RuntimeMessage, WatchCore, WatchEvent, WatchRuntime};
use sitepipe::errors::Result;
use sitepipe::watch::{spawn_debouncer, spawn_watcher};

type Session = JoinHandle<Result<Vec<(RunId, BuildReport)>>>;

fn chain() -> BuildGraph {
    ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("A").input("a/*.txt").build())
        .with_task(TaskConfigBuilder::new("B").after("A").input("b/*.txt").build())
        .with_task(TaskConfigBuilder::new("C").after("B").input("c/*.txt").build())
        .build()
        .build_graph()
        .expect("valid graph")
}

fn seed(project: &Project) {
    project.write("a/one.txt", "alpha");
    project.write("b/one.txt", "beta");
    project.write("c/one.txt", "gamma");
}

fn start(project: &Project, graph: BuildGraph, stage: &RecordingStage) -> (Session, mpsc::Sender<RuntimeMessage>) {
    let cache = IncrementalCache::load(&project.settings, graph.graph().task_ids());
    let scheduler = Scheduler::new(project.settings.clone(), stage.registry_for(&graph));
    let runtime = WatchRuntime::new(WatchCore::new(graph), scheduler, cache);
    let tx = runtime.sender();
    (tokio::spawn(runtime.run()), tx)
}

/// Poll until `stage` has seen `n` invocations.
async fn wait_for_calls(stage: &RecordingStage, n: usize) {
    timeout(Duration::from_secs(5), async {
        while stage.executed().len() < n {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stage invocations did not arrive in time");
}

async fn shutdown(session: Session, tx: &mpsc::Sender<RuntimeMessage>) -> Vec<(RunId, BuildReport)> {
    tx.send(WatchEvent::ShutdownRequested.into()).await.expect("runtime alive");
    timeout(Duration::from_secs(5), session)
        .await
        .expect("runtime did not stop")
        .expect("runtime panicked")
        .expect("runtime failed")
}

#[tokio::test]
async fn initial_run_builds_everything() -> TestResult {
    init_tracing();
    let project = Project::new();
    seed(&project);
    let stage = RecordingStage::new();
    let (session, tx) = start(&project, chain(), &stage);

    wait_for_calls(&stage, 3).await;
    sleep(Duration::from_millis(200)).await;
    let reports = shutdown(session, &tx).await;

    assert_eq!(reports.len(), 1);
    let (run_id, report) = &reports[0];
    assert_eq!(*run_id, 1);
    assert!(report.is_success(), "{report}");
    assert_eq!(stage.executed(), vec!["A", "B", "C"]);
    Ok(())
}

#[tokio::test]
async fn change_rebuilds_only_the_affected_subgraph() -> TestResult {
    let project = Project::new();
    seed(&project);
    let stage = RecordingStage::new();
    let (session, tx) = start(&project, chain(), &stage);

    wait_for_calls(&stage, 3).await;
    sleep(Duration::from_millis(200)).await;

    project.write("b/one.txt", "beta, revised");
    tx.send(WatchEvent::FilesChanged(vec!["b/one.txt".to_string()]).into())
        .await?;

    wait_for_calls(&stage, 5).await;
    sleep(Duration::from_millis(200)).await;
    let reports = shutdown(session, &tx).await;

    assert_eq!(stage.executed(), vec!["A", "B", "C", "B", "C"]);
    let (run_id, report) = &reports[1];
    assert_eq!(*run_id, 2);
    assert!(report.outcome("A").is_none());
    assert!(matches!(report.outcome("B"), Some(TaskOutcome::Succeeded { .. })));
    assert!(matches!(report.outcome("C"), Some(TaskOutcome::Succeeded { .. })));
    Ok(())
}

#[tokio::test]
async fn unrelated_change_starts_no_run() -> TestResult {
    let project = Project::new();
    seed(&project);
    let stage = RecordingStage::new();
    let (session, tx) = start(&project, chain(), &stage);

    wait_for_calls(&stage, 3).await;
    sleep(Duration::from_millis(200)).await;

    tx.send(WatchEvent::FilesChanged(vec!["README.md".to_string()]).into())
        .await?;
    sleep(Duration::from_millis(100)).await;
    let reports = shutdown(session, &tx).await;

    assert_eq!(reports.len(), 1);
    assert_eq!(stage.executed().len(), 3);
    Ok(())
}

#[tokio::test]
async fn change_during_run_cancels_and_restarts() -> TestResult {
    init_tracing();
    let project = Project::new();
    seed(&project);
    let stage = RecordingStage::new();
    stage.with_delay(Duration::from_millis(150));
    let (session, tx) = start(&project, chain(), &stage);

    // Run 1 is busy with A when the change arrives.
    wait_for_calls(&stage, 1).await;
    project.write("a/one.txt", "alpha, revised");
    tx.send(WatchEvent::FilesChanged(vec!["a/one.txt".to_string()]).into())
        .await?;

    // Run 1 invoked A once; run 2 invokes A, B and C.
    wait_for_calls(&stage, 4).await;
    sleep(Duration::from_millis(400)).await;
    let reports = shutdown(session, &tx).await;

    let ids: Vec<RunId> = reports.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(reports[0].1.was_cancelled());
    assert_eq!(reports[0].1.outcome("C"), Some(&TaskOutcome::Cancelled));
    assert!(reports[1].1.is_success(), "{}", reports[1].1);
    assert_eq!(stage.executed(), vec!["A", "A", "B", "C"]);
    assert!(project.read_output("A.txt").contains("a/one.txt"));
    Ok(())
}

#[tokio::test]
async fn shutdown_during_run_cancels_it() -> TestResult {
    let project = Project::new();
    seed(&project);
    let stage = RecordingStage::new();
    stage.with_delay(Duration::from_millis(200));
    let (session, tx) = start(&project, chain(), &stage);

    wait_for_calls(&stage, 1).await;
    let reports = shutdown(session, &tx).await;

    assert_eq!(reports.len(), 1);
    assert!(reports[0].1.was_cancelled());
    assert_eq!(stage.executed(), vec!["A"]);
    assert!(!project.output("A.txt").exists());
    Ok(())
}

#[tokio::test]
async fn file_watcher_drives_rebuilds() -> TestResult {
    init_tracing();
    let project = Project::new();
    seed(&project);
    let stage = RecordingStage::new();
    let (session, tx) = start(&project, chain(), &stage);

    let (watcher, paths) = spawn_watcher(&project.root)?;
    let root = watcher.root().to_path_buf();
    let output_root = root.join("dist");
    let _debouncer = spawn_debouncer(paths, root, output_root, Duration::from_millis(50), tx.clone());

    wait_for_calls(&stage, 3).await;
    sleep(Duration::from_millis(300)).await;

    project.write("c/one.txt", "gamma, revised");
    wait_for_calls(&stage, 4).await;
    sleep(Duration::from_millis(200)).await;
    let reports = shutdown(session, &tx).await;
    drop(watcher);

    assert_eq!(stage.executed()[3], "C");
    assert!(reports.iter().all(|(_, r)| r.is_success()));
    Ok(())
}

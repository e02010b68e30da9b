mod common;
use crate::common::builders::{ConfigFileBuilder, TaskConfigBuilder};
use crate::common::{Project, RecordingStage, TestResult, init_tracing};

use sitepipe::dag::{BuildGraph, TaskOutcome};
use sitepipe::stage::StageRegistry;

/// A -> B -> C, each with its own input directory.
fn chain() -> BuildGraph {
    ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("A").input("a/*.txt").build())
        .with_task(TaskConfigBuilder::new("B").after("A").input("b/*.txt").build())
        .with_task(TaskConfigBuilder::new("C").after("B").input("c/*.txt").build())
        .build()
        .build_graph()
        .expect("valid graph")
}

fn seed_chain(project: &Project) {
    project.write("a/one.txt", "alpha");
    project.write("b/one.txt", "beta");
    project.write("c/one.txt", "gamma");
}

#[tokio::test]
async fn second_build_is_fully_cached() -> TestResult {
    init_tracing();
    let project = Project::new();
    seed_chain(&project);
    let graph = chain();
    let stage = RecordingStage::new();

    let first = project.build(&graph, stage.registry_for(&graph)).await;
    assert!(first.is_success(), "{first}");
    assert_eq!(stage.executed(), vec!["A", "B", "C"]);
    assert!(project.cache_file().is_file());

    stage.reset();
    let second = project.build(&graph, stage.registry_for(&graph)).await;
    assert!(second.is_success());
    assert!(stage.executed().is_empty());
    assert_eq!(second.cached(), vec!["A", "B", "C"]);
    Ok(())
}

#[tokio::test]
async fn changed_input_reruns_task_and_its_dependents() -> TestResult {
    init_tracing();
    let project = Project::new();
    seed_chain(&project);
    let graph = chain();
    let stage = RecordingStage::new();

    project.build(&graph, stage.registry_for(&graph)).await;
    stage.reset();

    project.write("b/one.txt", "beta, revised");
    let report = project.build(&graph, stage.registry_for(&graph)).await;

    assert!(report.is_success());
    assert_eq!(stage.executed(), vec!["B", "C"]);
    assert_eq!(report.outcome("A"), Some(&TaskOutcome::Cached));
    assert!(project.read_output("B.txt").contains("b/one.txt"));
    Ok(())
}

#[tokio::test]
async fn new_and_removed_inputs_invalidate_the_entry() -> TestResult {
    let project = Project::new();
    seed_chain(&project);
    let graph = chain();
    let stage = RecordingStage::new();
    project.build(&graph, stage.registry_for(&graph)).await;

    stage.reset();
    project.write("c/two.txt", "delta");
    project.build(&graph, stage.registry_for(&graph)).await;
    assert_eq!(stage.executed(), vec!["C"]);

    stage.reset();
    project.remove("c/two.txt");
    project.build(&graph, stage.registry_for(&graph)).await;
    assert_eq!(stage.executed(), vec!["C"]);
    assert_eq!(stage.calls()[0].inputs, vec!["c/one.txt"]);
    Ok(())
}

#[tokio::test]
async fn missing_or_edited_output_forces_rerun() -> TestResult {
    let project = Project::new();
    seed_chain(&project);
    let graph = chain();
    let stage = RecordingStage::new();
    project.build(&graph, stage.registry_for(&graph)).await;

    stage.reset();
    std::fs::remove_file(project.output("C.txt"))?;
    project.build(&graph, stage.registry_for(&graph)).await;
    assert_eq!(stage.executed(), vec!["C"]);
    assert!(project.output("C.txt").is_file());

    stage.reset();
    std::fs::write(project.output("A.txt"), "hand edited")?;
    project.build(&graph, stage.registry_for(&graph)).await;
    assert_eq!(stage.executed(), vec!["A", "B", "C"]);
    Ok(())
}

#[tokio::test]
async fn changed_task_definition_reruns_the_task() -> TestResult {
    let project = Project::new();
    seed_chain(&project);
    let stage = RecordingStage::new();
    let graph = chain();
    project.build(&graph, stage.registry_for(&graph)).await;

    let changed = ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("A").input("a/*.txt").exclude("a/skip.txt").build())
        .with_task(TaskConfigBuilder::new("B").after("A").input("b/*.txt").build())
        .with_task(TaskConfigBuilder::new("C").after("B").input("c/*.txt").build())
        .build()
        .build_graph()?;

    stage.reset();
    project.build(&changed, stage.registry_for(&changed)).await;
    assert_eq!(stage.executed(), vec!["A", "B", "C"]);
    Ok(())
}

#[tokio::test]
async fn builtin_stages_produce_site_layout() -> TestResult {
    init_tracing();
    let project = Project::new();
    project.write("pages/index.html", "<h1>home</h1>");
    project.write("pages/blog/post.html", "<p>post</p>");
    project.write("styles/a.css", "a{}");
    project.write("styles/b.css", "b{}");

    let graph = ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("pages").input("pages/**/*.html").copy_from("pages").build())
        .with_task(
            TaskConfigBuilder::new("styles")
                .input("styles/*.css")
                .concat("site.css")
                .output("css")
                .build(),
        )
        .with_task(
            TaskConfigBuilder::new("precache")
                .after("pages")
                .after("styles")
                .input("dist/**/*.html")
                .input("dist/**/*.css")
                .precache("sw.js", "site-v1")
                .build(),
        )
        .build()
        .build_graph()?;
    assert_eq!(graph.levels().len(), 2);

    let report = project.build(&graph, StageRegistry::from_graph(&graph)).await;
    assert!(report.is_success(), "{report}");

    assert_eq!(project.read_output("index.html"), "<h1>home</h1>");
    assert_eq!(project.read_output("blog/post.html"), "<p>post</p>");
    assert_eq!(project.read_output("css/site.css"), "a{}\nb{}");

    let sw = project.read_output("sw.js");
    assert!(sw.starts_with("self.__precache = "));
    assert!(sw.contains("\"/index.html\""));
    assert!(sw.contains("\"/css/site.css\""));
    assert!(sw.contains("site-v1"));

    // Staging is cleaned up after promotion.
    let staging = project.settings.staging_root();
    assert!(!staging.exists() || std::fs::read_dir(&staging)?.next().is_none());
    Ok(())
}

#[tokio::test]
async fn outputs_no_longer_produced_are_removed() -> TestResult {
    let project = Project::new();
    project.write("pages/index.html", "home");
    project.write("pages/about.html", "about");

    let graph = ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("pages").input("pages/*.html").copy_from("pages").build())
        .build()
        .build_graph()?;

    project.build(&graph, StageRegistry::from_graph(&graph)).await;
    assert!(project.output("about.html").is_file());

    project.remove("pages/about.html");
    let report = project.build(&graph, StageRegistry::from_graph(&graph)).await;
    assert!(report.is_success());
    assert!(!project.output("about.html").exists());
    assert!(project.output("index.html").is_file());
    Ok(())
}

#[tokio::test]
async fn two_roots_and_a_join() -> TestResult {
    init_tracing();
    let project = Project::new();
    project.write("a/one.txt", "alpha");
    project.write("b/one.txt", "beta");

    let graph = ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("A").input("a/*.txt").build())
        .with_task(TaskConfigBuilder::new("B").input("b/*.txt").build())
        .with_task(TaskConfigBuilder::new("C").after("A").after("B").build())
        .build()
        .build_graph()?;
    let levels: Vec<Vec<&str>> = graph
        .levels()
        .iter()
        .map(|l| l.iter().map(|t| t.id.as_str()).collect())
        .collect();
    assert_eq!(levels, vec![vec!["A", "B"], vec!["C"]]);

    let stage = RecordingStage::new();
    stage.with_delay(std::time::Duration::from_millis(30));
    project.build(&graph, stage.registry_for(&graph)).await;
    assert_eq!(stage.max_concurrency(), 2);
    assert_eq!(stage.executed().last().map(String::as_str), Some("C"));

    stage.reset();
    project.build(&graph, stage.registry_for(&graph)).await;
    assert!(stage.executed().is_empty());

    project.write("b/one.txt", "beta, revised");
    let report = project.build(&graph, stage.registry_for(&graph)).await;
    assert_eq!(stage.executed(), vec!["B", "C"]);
    assert_eq!(report.outcome("A"), Some(&TaskOutcome::Cached));
    Ok(())
}

#[tokio::test]
async fn task_reading_its_own_output_dir_settles() -> TestResult {
    let project = Project::new();
    project.write("pages/index.html", "home");
    project.write("pages/about.html", "about");

    let graph = ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("pages").input("pages/*.html").copy_from("pages").build())
        .with_task(
            TaskConfigBuilder::new("sw")
                .after("pages")
                .input("dist/**")
                .precache("sw.js", "site-v1")
                .build(),
        )
        .build()
        .build_graph()?;

    let first = project.build(&graph, StageRegistry::from_graph(&graph)).await;
    assert!(first.is_success(), "{first}");
    let manifest = project.read_output("sw.js");
    assert!(!manifest.contains("/sw.js"), "{manifest}");

    for _ in 0..3 {
        let report = project.build(&graph, StageRegistry::from_graph(&graph)).await;
        assert!(report.executed().is_empty(), "{report}");
        assert_eq!(report.outcome("sw"), Some(&TaskOutcome::Cached));
    }
    assert_eq!(project.read_output("sw.js"), manifest);

    project.write("pages/index.html", "new home");
    let report = project.build(&graph, StageRegistry::from_graph(&graph)).await;
    assert_eq!(report.executed(), vec!["pages", "sw"]);
    assert!(!project.read_output("sw.js").contains("/sw.js"));
    Ok(())
}

#![allow(dead_code)]

use std::error::Error;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use sitepipe::config::{BuildSettings, ConfigSection};
use sitepipe::dag::{BuildGraph, BuildReport};
use sitepipe::stage::StageRegistry;

pub use sitepipe_test_utils::builders;
pub use sitepipe_test_utils::{RecordingStage, ScriptedGit, init_tracing, write_file};

pub type TestResult = Result<(), Box<dyn Error>>;

/// A throwaway project directory with resolved build settings.
pub struct Project {
    _dir: TempDir,
    pub root: PathBuf,
    pub settings: BuildSettings,
}

impl Project {
    pub fn new() -> Self {
        Self::with_section(ConfigSection::default())
    }

    pub fn with_section(section: ConfigSection) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().canonicalize().expect("canonicalize temp dir");
        let settings = BuildSettings::from_config(&root, &section).expect("valid settings");
        Self {
            _dir: dir,
            root,
            settings,
        }
    }

    pub fn write(&self, rel: &str, contents: &str) {
        write_file(&self.root, rel, contents);
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.root.join(rel)).expect("remove test file");
    }

    /// Path below the output root.
    pub fn output(&self, rel: &str) -> PathBuf {
        self.settings.output_root.join(rel)
    }

    pub fn read_output(&self, rel: &str) -> String {
        std::fs::read_to_string(self.output(rel)).expect("read output file")
    }

    pub fn cache_file(&self) -> PathBuf {
        self.settings.cache_path()
    }

    /// One full build with a freshly loaded cache, as `sitepipe build` does.
    pub async fn build(&self, graph: &BuildGraph, stages: StageRegistry) -> BuildReport {
        sitepipe::build_once(&self.settings, graph, stages).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

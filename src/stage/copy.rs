// src/stage/copy.rs

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::trace;

use super::{Stage, StageFuture, StageInvocation};

/// Copies every input into the output directory, keeping its path relative
/// to `base` (or to the project root when no base is set).
#[derive(Debug, Clone)]
pub struct CopyStage {
    base: Option<PathBuf>,
}

impl CopyStage {
    pub fn new(base: Option<String>) -> Self {
        Self {
            base: base.map(PathBuf::from),
        }
    }

    fn base_dir(&self, project_root: &Path) -> PathBuf {
        match &self.base {
            Some(base) => project_root.join(base),
            None => project_root.to_path_buf(),
        }
    }
}

impl Stage for CopyStage {
    fn kind(&self) -> &'static str {
        "copy"
    }

    fn run<'a>(&'a self, inv: &'a StageInvocation) -> StageFuture<'a> {
        Box::pin(async move {
            let base = self.base_dir(&inv.project_root);
            let mut written = Vec::with_capacity(inv.inputs.len());

            for input in &inv.inputs {
                let rel = input.path.strip_prefix(&base).map_err(|_| {
                    anyhow!("input {} is outside copy base {:?}", input.rel, base)
                })?;
                let dest = inv.staging_dir.join(rel);
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("creating directory {:?}", parent))?;
                }
                tokio::fs::copy(&input.path, &dest)
                    .await
                    .with_context(|| format!("copying {} to {:?}", input.rel, dest))?;
                trace!(task = %inv.task.id, from = %input.rel, "copied");
                written.push(dest);
            }

            Ok(written)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::StageConfig;
    use crate::dag::task::Task;
    use crate::stage::test_support::invocation;

    #[tokio::test]
    async fn copies_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("app/img/icons")).unwrap();
        std::fs::write(root.join("app/img/logo.png"), b"png").unwrap();
        std::fs::write(root.join("app/img/icons/x.svg"), b"svg").unwrap();

        let task = Task::new(
            "images",
            vec![],
            vec!["app/img/**".into()],
            vec![],
            "img",
            StageConfig::Copy {
                base: Some("app/img".into()),
            },
        )
        .unwrap();
        let inv = invocation(root, task, &["app/img/icons/x.svg", "app/img/logo.png"]);

        let stage = CopyStage::new(Some("app/img".into()));
        let written = stage.run(&inv).await.unwrap();

        assert_eq!(
            written,
            vec![inv.staging_dir.join("icons/x.svg"), inv.staging_dir.join("logo.png")]
        );
        assert_eq!(std::fs::read(inv.staging_dir.join("logo.png")).unwrap(), b"png");
    }

    #[tokio::test]
    async fn input_outside_base_fails() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("README.md"), b"readme").unwrap();

        let task = Task::new("docs", vec![], vec!["*.md".into()], vec![], "", StageConfig::Copy { base: Some("app".into()) }).unwrap();
        let inv = invocation(root, task, &["README.md"]);

        let err = CopyStage::new(Some("app".into())).run(&inv).await.unwrap_err();
        assert!(err.to_string().contains("outside copy base"));
    }
}

// src/stage/concat.rs

use anyhow::Context;

use super::{Stage, StageFuture, StageInvocation, write_staged};

/// Concatenates inputs, in resolved order, into a single file.
#[derive(Debug, Clone)]
pub struct ConcatStage {
    file: String,
    separator: String,
}

impl ConcatStage {
    pub fn new(file: String, separator: Option<String>) -> Self {
        Self {
            file,
            separator: separator.unwrap_or_else(|| "\n".to_string()),
        }
    }
}

impl Stage for ConcatStage {
    fn kind(&self) -> &'static str {
        "concat"
    }

    fn run<'a>(&'a self, inv: &'a StageInvocation) -> StageFuture<'a> {
        Box::pin(async move {
            let mut bundle: Vec<u8> = Vec::new();
            for (i, input) in inv.inputs.iter().enumerate() {
                if i > 0 {
                    bundle.extend_from_slice(self.separator.as_bytes());
                }
                let bytes = tokio::fs::read(&input.path)
                    .await
                    .with_context(|| format!("reading {}", input.rel))?;
                bundle.extend_from_slice(&bytes);
            }

            let dest = inv.staging_dir.join(&self.file);
            write_staged(&dest, &bundle).await?;
            Ok(vec![dest])
        })
    }
}

//! Output materialization: read back, validate, and hand over the result.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use sidebyside_common::error::{ComposeError, ComposeResult};
use sidebyside_media_engine::Workspace;

use crate::plan::OutputSpec;

/// A validated, non-empty composed output.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedArtifact {
    bytes: Vec<u8>,
    media_type: &'static str,
    file_name: String,
    produced_at: DateTime<Utc>,
}

/// What the job state exposes about a finished artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub file_name: String,
    pub media_type: String,
    pub byte_len: usize,
    /// When the output was read back from the engine (RFC 3339 in JSON).
    pub produced_at: DateTime<Utc>,
}

impl ComposedArtifact {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn media_type(&self) -> &'static str {
        self.media_type
    }

    /// `output.gif` or `output.mp4`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            file_name: self.file_name.clone(),
            media_type: self.media_type.to_string(),
            byte_len: self.bytes.len(),
            produced_at: self.produced_at,
        }
    }

    /// Write the artifact into `dir` under its own file name.
    pub async fn save_in(&self, dir: impl AsRef<Path>) -> ComposeResult<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        self.write_to(&path).await?;
        Ok(path)
    }

    /// Write the artifact to an explicit path, creating parent directories.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> ComposeResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &self.bytes).await?;
        tracing::info!(path = %path.display(), bytes = self.bytes.len(), "Wrote artifact");
        Ok(())
    }
}

/// Read the plan's output from the workspace and validate it.
///
/// A zero-length output is an error, never an artifact.
pub async fn materialize(workspace: &dyn Workspace, output: &OutputSpec) -> ComposeResult<ComposedArtifact> {
    let bytes = workspace.read(&output.file_name).await?;
    if bytes.is_empty() {
        return Err(ComposeError::empty_output(&output.file_name));
    }

    tracing::debug!(
        name = %output.file_name,
        bytes = bytes.len(),
        media_type = output.media_type,
        "Materialized output"
    );

    Ok(ComposedArtifact {
        bytes,
        media_type: output.media_type,
        file_name: output.file_name.clone(),
        produced_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::OutputKind;
    use crate::clip::Pair;
    use crate::plan::TranscodePlan;
    use sidebyside_media_engine::MemoryWorkspace;

    fn gif_output() -> OutputSpec {
        TranscodePlan::compile(
            OutputKind::LoopingImage,
            Pair::new("before.mp4".to_string(), "after.mp4".to_string()),
            Pair::default(),
            Pair::default(),
        )
        .output
    }

    #[tokio::test]
    async fn test_empty_output_is_rejected() {
        let ws = MemoryWorkspace::new();
        ws.put("output.gif", Vec::new());
        let err = materialize(&ws, &gif_output()).await.unwrap_err();
        assert!(matches!(err, ComposeError::EmptyOutput { .. }));
    }

    #[tokio::test]
    async fn test_missing_output_is_not_found() {
        let ws = MemoryWorkspace::new();
        let err = materialize(&ws, &gif_output()).await.unwrap_err();
        assert!(matches!(err, ComposeError::OutputNotFound { .. }));
    }

    #[tokio::test]
    async fn test_artifact_carries_media_type() {
        let ws = MemoryWorkspace::new();
        ws.put("output.gif", b"GIF89a....".to_vec());
        let artifact = materialize(&ws, &gif_output()).await.unwrap();
        assert_eq!(artifact.media_type(), "image/gif");
        assert_eq!(artifact.file_name(), "output.gif");
        assert_eq!(artifact.summary().byte_len, 10);
    }

    #[tokio::test]
    async fn test_summary_is_stamped_at_materialization() {
        let ws = MemoryWorkspace::new();
        ws.put("output.gif", b"GIF89a".to_vec());
        let before = Utc::now();
        let summary = materialize(&ws, &gif_output()).await.unwrap().summary();
        assert!(summary.produced_at >= before && summary.produced_at <= Utc::now());

        let json = serde_json::to_value(&summary).unwrap();
        let stamp = json["produced_at"].as_str().unwrap();
        assert_eq!(
            DateTime::parse_from_rfc3339(stamp).unwrap().with_timezone(&Utc),
            summary.produced_at
        );
    }

    #[tokio::test]
    async fn test_save_in_uses_output_name() {
        let ws = MemoryWorkspace::new();
        ws.put("output.gif", b"GIF89a".to_vec());
        let artifact = materialize(&ws, &gif_output()).await.unwrap();

        let dir = std::env::temp_dir().join(format!("sidebyside-artifact-{}", std::process::id()));
        let path = artifact.save_in(&dir).await.unwrap();
        assert_eq!(path, dir.join("output.gif"));
        assert_eq!(std::fs::read(&path).unwrap(), b"GIF89a");
        std::fs::remove_dir_all(&dir).ok();
    }
}

//! Job executor: stages inputs, runs one plan at a time, publishes state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;

use sidebyside_common::error::{ComposeError, ComposeResult};
use sidebyside_media_engine::{EngineHandle, JobLease};

use crate::artifact::{materialize, ArtifactSummary, ComposedArtifact};
use crate::classify::{classify, JobFailure};
use crate::clip::{ClipDuration, ClipOffset, OutputKind, Pair, SourceClip};
use crate::plan::{TranscodePlan, FONT_NAME};

/// Observable state of the pipeline's current (or last) job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Idle,
    LoadingEngine,
    Running { percent: u8 },
    Succeeded { summary: ArtifactSummary },
    Failed { failure: JobFailure },
}

impl JobState {
    /// Progress percent while running, 100 once succeeded.
    pub fn percent(&self) -> Option<u8> {
        match self {
            JobState::Running { percent } => Some(*percent),
            JobState::Succeeded { .. } => Some(100),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded { .. } | JobState::Failed { .. })
    }
}

/// Everything one job needs. Clips are borrowed for the duration of staging.
#[derive(Debug, Clone, Copy)]
pub struct ComposeRequest<'a> {
    pub clips: Pair<&'a SourceClip>,
    pub offsets: Pair<ClipOffset>,
    pub durations: Pair<ClipDuration>,
    pub kind: OutputKind,
}

impl<'a> ComposeRequest<'a> {
    /// Zero offsets, no durations, looping image output.
    pub fn new(before: &'a SourceClip, after: &'a SourceClip) -> Self {
        Self {
            clips: Pair::new(before, after),
            offsets: Pair::default(),
            durations: Pair::default(),
            kind: OutputKind::default(),
        }
    }

    pub fn with_offsets(mut self, offsets: Pair<ClipOffset>) -> Self {
        self.offsets = offsets;
        self
    }

    pub fn with_durations(mut self, durations: Pair<ClipDuration>) -> Self {
        self.durations = durations;
        self
    }

    pub fn with_kind(mut self, kind: OutputKind) -> Self {
        self.kind = kind;
        self
    }
}

/// The label font, staged into the workspace on every job.
#[derive(Debug, Clone)]
pub enum FontAsset {
    /// Read from disk each time it is staged.
    File(PathBuf),
    Embedded(Arc<[u8]>),
}

impl FontAsset {
    async fn load(&self) -> ComposeResult<Vec<u8>> {
        match self {
            FontAsset::File(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(ComposeError::FileNotFound { path: path.clone() })
                }
                Err(e) => Err(e.into()),
            },
            FontAsset::Embedded(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// Why `generate` returned without an artifact.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerateError {
    #[error("A composition job is already running")]
    Busy,

    #[error(transparent)]
    Failed(JobFailure),
}

/// Runs before/after composition jobs against a shared engine.
///
/// Jobs are single-flight per engine handle: pipelines sharing a handle also
/// share its one-job-at-a-time lease.
pub struct Pipeline {
    engine: Arc<EngineHandle>,
    font: FontAsset,
    state: watch::Sender<JobState>,
}

impl Pipeline {
    pub fn new(engine: Arc<EngineHandle>, font: FontAsset) -> Self {
        let (state, _) = watch::channel(JobState::Idle);
        Self {
            engine,
            font,
            state,
        }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Snapshot of the current job state.
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    /// Whether a job (from this or any pipeline sharing the engine) is running.
    pub fn is_busy(&self) -> bool {
        self.engine.is_leased()
    }

    fn publish(&self, state: JobState) {
        tracing::trace!(?state, "Job state");
        self.state.send_replace(state);
    }

    /// Compose the two clips side by side.
    ///
    /// Returns [`GenerateError::Busy`] immediately if another job is running;
    /// state is left untouched in that case.
    pub async fn generate(&self, request: ComposeRequest<'_>) -> Result<ComposedArtifact, GenerateError> {
        let Some(lease) = self.engine.try_lease() else {
            tracing::warn!("Rejected job: engine busy");
            return Err(GenerateError::Busy);
        };

        let started = Instant::now();
        tracing::info!(
            kind = %request.kind,
            before_bytes = request.clips.before.len(),
            after_bytes = request.clips.after.len(),
            before_offset = request.offsets.before.secs(),
            after_offset = request.offsets.after.secs(),
            "Starting composition job"
        );

        match self.execute(&lease, &request).await {
            Ok(artifact) => {
                self.publish(JobState::Running { percent: 100 });
                self.publish(JobState::Succeeded {
                    summary: artifact.summary(),
                });
                tracing::info!(
                    file = artifact.file_name(),
                    bytes = artifact.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "Composition job succeeded"
                );
                Ok(artifact)
            }
            Err(err) => {
                let failure = classify(&err);
                tracing::error!(
                    kind = ?failure.kind,
                    detail = %failure.detail,
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Composition job failed"
                );
                self.publish(JobState::Failed {
                    failure: failure.clone(),
                });
                Err(GenerateError::Failed(failure))
            }
        }
    }

    async fn execute(
        &self,
        lease: &JobLease<'_>,
        request: &ComposeRequest<'_>,
    ) -> ComposeResult<ComposedArtifact> {
        if !lease.handle().is_ready() {
            self.publish(JobState::LoadingEngine);
        }
        let engine = lease.engine().await?;
        let workspace = engine.workspace();

        let font = self.font.load().await?;
        workspace.write(FONT_NAME, &font).await?;

        let names = Pair::new(
            format!("before.{}", request.clips.before.staging_extension()),
            format!("after.{}", request.clips.after.staging_extension()),
        );
        workspace
            .write(&names.before, request.clips.before.bytes())
            .await?;
        workspace
            .write(&names.after, request.clips.after.bytes())
            .await?;
        tracing::debug!(
            font_bytes = font.len(),
            before = %names.before,
            after = %names.after,
            "Staged job inputs"
        );

        let plan = TranscodePlan::compile(request.kind, names, request.offsets, request.durations);
        tracing::debug!(
            graph_len = plan.graph.to_string().len(),
            declared_durations = ?plan.declared_durations,
            "Compiled transcode plan"
        );

        // A previous job's output must never be read back as this one's.
        workspace.remove(&plan.output.file_name).await?;

        self.publish(JobState::Running { percent: 0 });
        let state = &self.state;
        let on_progress = |percent: u8| {
            state.send_replace(JobState::Running { percent });
        };
        lease.run(&plan.invocation(), &on_progress).await?;

        materialize(workspace, &plan.output).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("engine", &self.engine)
            .field("font", &self.font)
            .field("state", &*self.state.borrow())
            .field("busy", &self.is_busy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_percent() {
        assert_eq!(JobState::Idle.percent(), None);
        assert_eq!(JobState::Running { percent: 42 }.percent(), Some(42));
        assert!(!JobState::LoadingEngine.is_terminal());
    }

    #[test]
    fn test_job_state_serializes_with_tag() {
        let json = serde_json::to_string(&JobState::Running { percent: 7 }).unwrap();
        assert_eq!(json, r#"{"state":"running","percent":7}"#);
    }

    #[tokio::test]
    async fn test_missing_font_file() {
        let font = FontAsset::File(PathBuf::from("/nonexistent/sidebyside/font.ttf"));
        assert!(matches!(
            font.load().await,
            Err(ComposeError::FileNotFound { .. })
        ));
    }
}

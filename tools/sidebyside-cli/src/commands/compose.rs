//! Run a composition job.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use sidebyside_common::config::EngineConfig;
use sidebyside_compose::{
    ComposeRequest, ComposedArtifact, FontAsset, GenerateError, JobState, Pair, Pipeline,
    SourceClip,
};
use sidebyside_media_engine::{EngineHandle, FfmpegLoader};

use crate::JobArgs;

pub async fn run(
    engine: EngineConfig,
    before: PathBuf,
    after: PathBuf,
    job: JobArgs,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let params = job.params()?;

    let before_clip = SourceClip::from_path(&before)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read before clip: {e}"))?;
    let after_clip = SourceClip::from_path(&after)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read after clip: {e}"))?;

    println!("Composing:");
    println!("  Before: {} (from {:.2}s)", before.display(), params.offsets.before.secs());
    println!("  After:  {} (from {:.2}s)", after.display(), params.offsets.after.secs());
    println!("  Format: {}", params.kind);

    let font = FontAsset::File(engine.font_path.clone());
    let pipeline = Pipeline::new(
        Arc::new(EngineHandle::new(FfmpegLoader::new(engine))),
        font,
    );

    let request = ComposeRequest {
        clips: Pair::new(&before_clip, &after_clip),
        offsets: params.offsets,
        durations: params.durations,
        kind: params.kind,
    };

    let artifact = match generate_with_progress(&pipeline, request).await {
        Ok(artifact) => artifact,
        Err(GenerateError::Failed(failure)) => {
            println!("{}", failure.message);
            println!("  {}", failure.detail);
            if failure.retryable() {
                println!("  Run `sidebyside check` to verify the engine setup.");
            }
            tracing::debug!(cause = %failure.cause, "Job failure cause");
            return Err(anyhow::anyhow!("{failure}"));
        }
        Err(e @ GenerateError::Busy) => return Err(e.into()),
    };

    let path = match output {
        None => artifact.save_in(std::env::current_dir()?).await?,
        Some(dir) if dir.is_dir() => artifact.save_in(&dir).await?,
        Some(path) => {
            artifact.write_to(&path).await?;
            path
        }
    };

    let summary = artifact.summary();
    println!(
        "Compose complete: {} ({}, {} bytes, produced {})",
        path.display(),
        summary.media_type,
        summary.byte_len,
        summary.produced_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

/// Run the job while printing its progress line.
///
/// A rejected job publishes no terminal state, so the printer is aborted
/// rather than awaited in that case.
async fn generate_with_progress(
    pipeline: &Pipeline,
    request: ComposeRequest<'_>,
) -> Result<ComposedArtifact, GenerateError> {
    let mut states = pipeline.subscribe();
    let printer = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match &state {
                JobState::LoadingEngine => println!("  Loading engine..."),
                JobState::Running { percent } => {
                    print!("\r  Progress: {percent:>3}%");
                    std::io::stdout().flush().ok();
                }
                _ => {}
            }
            if state.is_terminal() {
                println!();
                break;
            }
        }
    });

    let result = pipeline.generate(request).await;
    if matches!(result, Err(GenerateError::Busy)) {
        printer.abort();
    }
    printer.await.ok();
    result
}

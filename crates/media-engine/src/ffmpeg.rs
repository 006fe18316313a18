//! ffmpeg-backed engine.
//!
//! Each invocation spawns the system `ffmpeg` with the workspace directory as
//! its current directory, so plans refer to staged blobs by bare name.
//! Progress comes from `-progress pipe:1`; stderr is drained concurrently and
//! kept for failure diagnostics.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use sidebyside_common::config::EngineConfig;
use sidebyside_common::error::{ComposeError, ComposeResult};

use crate::engine::{Engine, EngineLoader, Invocation};
use crate::progress::ProgressState;
use crate::workspace::{DirWorkspace, Workspace};

const STALL_WARNING_SECS: u64 = 10;
const STDERR_TAIL_LINES: usize = 8;

/// Initializes [`FfmpegEngine`]: verifies the binary and prepares the workspace.
#[derive(Debug, Clone)]
pub struct FfmpegLoader {
    config: EngineConfig,
}

impl FfmpegLoader {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl EngineLoader for FfmpegLoader {
    async fn load(&self) -> ComposeResult<Arc<dyn Engine>> {
        let version = binary_version(&self.config.ffmpeg_path)
            .await
            .ok_or_else(|| {
                ComposeError::engine_unavailable(format!(
                    "ffmpeg is not runnable at {} (is it installed and on PATH?)",
                    self.config.ffmpeg_path.display()
                ))
            })?;

        let probe_available = binary_version(&self.config.ffprobe_path).await.is_some();
        if !probe_available {
            tracing::warn!(
                ffprobe = %self.config.ffprobe_path.display(),
                "ffprobe not available; progress will only be reported at completion"
            );
        }

        let workspace = match &self.config.workspace_dir {
            Some(dir) => DirWorkspace::open(dir).await,
            None => DirWorkspace::temporary("sidebyside").await,
        }
        .map_err(|e| {
            ComposeError::engine_unavailable(format!("Failed to prepare workspace: {e}"))
        })?;

        tracing::info!(
            %version,
            workspace = %workspace.root().display(),
            temporary = self.config.workspace_dir.is_none(),
            "ffmpeg engine loaded"
        );

        Ok(Arc::new(FfmpegEngine {
            ffmpeg: self.config.ffmpeg_path.clone(),
            ffprobe: probe_available.then(|| self.config.ffprobe_path.clone()),
            workspace,
        }))
    }
}

/// Engine that runs the system ffmpeg binary against a [`DirWorkspace`].
#[derive(Debug)]
pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    ffprobe: Option<PathBuf>,
    workspace: DirWorkspace,
}

/// What probing the inputs revealed before a run.
#[derive(Debug, Default)]
struct InputSurvey {
    /// Estimated output length: the longest remaining input.
    expected_secs: Option<f64>,
    /// Set when the probed video heights differ.
    height_mismatch: Option<String>,
}

impl FfmpegEngine {
    async fn survey_inputs(&self, invocation: &Invocation) -> InputSurvey {
        let Some(ffprobe) = self.ffprobe.as_ref() else {
            return InputSurvey::default();
        };
        let mut expected: Option<f64> = None;
        let mut heights = Vec::with_capacity(invocation.inputs.len());

        for input in &invocation.inputs {
            let Some(info) = probe_input(ffprobe, self.workspace.root(), &input.name).await else {
                tracing::debug!(input = %input.name, "ffprobe could not read input");
                continue;
            };
            tracing::debug!(
                input = %input.name,
                width = ?info.width,
                height = ?info.height,
                duration_secs = ?info.duration_secs,
                seek_secs = input.seek_secs,
                "Probed input"
            );
            if let Some(height) = info.height {
                heights.push((input.name.as_str(), height));
            }
            if let Some(duration) = info.duration_secs {
                let remaining = (duration - input.seek_secs).max(0.0);
                expected = Some(expected.map_or(remaining, |e: f64| e.max(remaining)));
            }
        }

        let height_mismatch = describe_height_mismatch(&heights);
        if let Some(mismatch) = &height_mismatch {
            tracing::warn!(%mismatch, "Input heights differ; horizontal stacking is expected to fail");
        }

        InputSurvey {
            expected_secs: expected,
            height_mismatch,
        }
    }
}

fn describe_height_mismatch(heights: &[(&str, u32)]) -> Option<String> {
    let (first_name, first) = heights.first()?;
    let (name, height) = heights.iter().find(|(_, h)| h != first)?;
    Some(format!("{name} is {height}px high, {first_name} is {first}px high"))
}

/// The line ffmpeg's stacking filters log when input heights differ.
fn stderr_height_mismatch(stderr: &str) -> Option<&str> {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| line.contains("height") && line.contains("does not match input"))
}

#[async_trait::async_trait]
impl Engine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn workspace(&self) -> &dyn Workspace {
        &self.workspace
    }

    async fn run(
        &self,
        invocation: &Invocation,
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> ComposeResult<()> {
        let survey = self.survey_inputs(invocation).await;
        let expected_secs = survey.expected_secs;

        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(invocation.args.iter().cloned());

        tracing::debug!(args = ?args, "Running ffmpeg");
        let start = Instant::now();
        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .current_dir(self.workspace.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ComposeError::engine_execution(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(
            pid = child.id(),
            output = %invocation.output,
            expected_secs = ?expected_secs,
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ComposeError::engine_execution("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ComposeError::engine_execution("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        let mut last_progress_secs = 0.0f64;
        let mut last_progress_wall = Instant::now();
        while let Some(line) = lines.next_line().await.map_err(|e| {
            ComposeError::engine_execution(format!("Failed reading ffmpeg progress: {e}"))
        })? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                continue;
            };
            state.update(key, value);
            if key != "progress" {
                continue;
            }

            if state.out_time_secs > last_progress_secs + 0.001 {
                last_progress_secs = state.out_time_secs;
                last_progress_wall = Instant::now();
            }
            if let Some(ratio) = state.ratio(expected_secs) {
                progress(ratio);
            }
            if last_progress_wall.elapsed().as_secs() >= STALL_WARNING_SECS {
                tracing::warn!(
                    out_time_secs = state.out_time_secs,
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "No ffmpeg progress advancement for {STALL_WARNING_SECS}s"
                );
                last_progress_wall = Instant::now();
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ComposeError::engine_execution(format!("Failed to wait on ffmpeg: {e}")))?;

        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            tracing::debug!(stderr = %stderr_output, "ffmpeg stderr");
            if let Some(line) = stderr_height_mismatch(&stderr_output) {
                return Err(ComposeError::resolution_mismatch(line));
            }
            if let Some(mismatch) = survey.height_mismatch {
                return Err(ComposeError::resolution_mismatch(format!(
                    "{mismatch}; ffmpeg exited with {status}"
                )));
            }
            return Err(ComposeError::engine_execution(format!(
                "ffmpeg exited with {status}: {}",
                stderr_tail(&stderr_output, STDERR_TAIL_LINES)
            )));
        }

        if !stderr_output.trim().is_empty() {
            tracing::warn!(
                stderr = %stderr_tail(&stderr_output, STDERR_TAIL_LINES),
                "ffmpeg reported errors but exited successfully"
            );
        }

        tracing::info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            out_time_secs = state.out_time_secs,
            "ffmpeg finished"
        );
        Ok(())
    }
}

/// First line of `<binary> -version`, or `None` if it cannot be run.
pub async fn binary_version(binary: &Path) -> Option<String> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}

/// Basic facts about an input's first video stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: Option<f64>,
}

/// Run ffprobe on a workspace blob.
pub async fn probe_input(ffprobe: &Path, workspace_root: &Path, name: &str) -> Option<ProbeInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height:format=duration",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(name)
        .current_dir(workspace_root)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8(output.stdout).ok()?;
    Some(parse_probe_output(&raw))
}

fn parse_probe_output(raw: &str) -> ProbeInfo {
    let mut info = ProbeInfo::default();
    for line in raw.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => info.width = value.parse().ok().filter(|w| *w > 0),
            "height" => info.height = value.parse().ok().filter(|h| *h > 0),
            "duration" => {
                info.duration_secs = value.parse::<f64>().ok().filter(|d| d.is_finite() && *d > 0.0)
            }
            _ => {}
        }
    }
    info
}

/// Last `max_lines` non-empty lines of `output`, joined for a one-line message.
fn stderr_tail(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return "<no stderr output>".to_string();
    }
    lines[lines.len().saturating_sub(max_lines)..].join(" | ")
}

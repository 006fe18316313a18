//! Job inputs: source clips, offsets, durations, and the output kind.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use sidebyside_common::error::{ComposeError, ComposeResult};

/// One value per side of the composition.
///
/// `before` is source 0 (left half), `after` is source 1 (right half).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pair<T> {
    pub before: T,
    pub after: T,
}

impl<T> Pair<T> {
    pub fn new(before: T, after: T) -> Self {
        Self { before, after }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Pair<U> {
        Pair {
            before: f(self.before),
            after: f(self.after),
        }
    }

    /// Values in stream order (before, then after).
    pub fn into_array(self) -> [T; 2] {
        [self.before, self.after]
    }
}

/// A media blob supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceClip {
    bytes: Vec<u8>,
    media_type: String,
}

impl SourceClip {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
        }
    }

    /// Read a clip from disk, guessing the media type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> ComposeResult<Self> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ComposeError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        Ok(Self::new(bytes, media_type_for_extension(&extension)))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension used when staging this clip.
    ///
    /// The engine probes content, so unknown types fall back to `mp4`.
    pub fn staging_extension(&self) -> &'static str {
        match self.media_type.as_str() {
            "video/quicktime" => "mov",
            "video/webm" => "webm",
            "video/x-matroska" => "mkv",
            "video/x-msvideo" => "avi",
            "image/gif" => "gif",
            _ => "mp4",
        }
    }
}

fn media_type_for_extension(extension: &str) -> &'static str {
    match extension {
        "mov" | "qt" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "gif" => "image/gif",
        "mp4" | "m4v" => "video/mp4",
        _ => "application/octet-stream",
    }
}

fn non_negative_secs(what: &str, secs: f64) -> ComposeResult<f64> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ComposeError::invalid_input(format!(
            "{what} must be a finite, non-negative number of seconds (got {secs})"
        )));
    }
    Ok(secs)
}

/// Where playback of a clip should visibly start, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize)]
pub struct ClipOffset(f64);

impl ClipOffset {
    pub const ZERO: Self = Self(0.0);

    pub fn new(secs: f64) -> ComposeResult<Self> {
        non_negative_secs("Clip offset", secs).map(Self)
    }

    pub fn secs(self) -> f64 {
        self.0
    }
}

/// Declared clip length in seconds.
///
/// Informational only: it is carried into the plan for diagnostics but does
/// not trim the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize)]
pub struct ClipDuration(f64);

impl ClipDuration {
    pub fn new(secs: f64) -> ComposeResult<Self> {
        non_negative_secs("Clip duration", secs).map(Self)
    }

    pub fn secs(self) -> f64 {
        self.0
    }
}

/// What kind of artifact to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// Looping GIF, 10 fps, no audio.
    #[default]
    LoopingImage,
    /// MP4 (H.264), 30 fps, source-0 audio, fast-start.
    Video,
}

impl OutputKind {
    pub fn extension(self) -> &'static str {
        match self {
            OutputKind::LoopingImage => "gif",
            OutputKind::Video => "mp4",
        }
    }

    pub fn file_name(self) -> String {
        format!("output.{}", self.extension())
    }

    pub fn media_type(self) -> &'static str {
        match self {
            OutputKind::LoopingImage => "image/gif",
            OutputKind::Video => "video/mp4",
        }
    }

    /// Output frame rate. GIF players expect low rates; video wants smooth motion.
    pub fn fps(self) -> u32 {
        match self {
            OutputKind::LoopingImage => 10,
            OutputKind::Video => 30,
        }
    }

    pub fn keeps_audio(self) -> bool {
        matches!(self, OutputKind::Video)
    }

    pub fn fast_start(self) -> bool {
        matches!(self, OutputKind::Video)
    }
}

impl FromStr for OutputKind {
    type Err = ComposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gif" | "image" | "looping-image" => Ok(OutputKind::LoopingImage),
            "mp4" | "video" => Ok(OutputKind::Video),
            other => Err(ComposeError::invalid_input(format!(
                "Unknown output kind: {other}. Use: gif, mp4"
            ))),
        }
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

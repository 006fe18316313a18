//! Maps pipeline errors onto the small set of user-facing failure kinds.

use serde::Serialize;

use sidebyside_common::error::ComposeError;

/// User-facing failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The engine could not be initialized. Retrying may succeed.
    EngineUnavailable,
    /// The engine rejected or failed on the inputs.
    EngineExecutionError,
    /// The run finished but wrote nothing; usually mismatched clip resolutions.
    EmptyOutput,
}

/// A classified job failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}: {detail}")]
pub struct JobFailure {
    pub kind: FailureKind,
    /// Short, actionable message shared by all kinds.
    pub message: String,
    /// Kind-specific explanation.
    pub detail: String,
    /// Underlying error, for logs.
    pub cause: String,
}

const MESSAGE: &str = "Failed to generate output";

impl JobFailure {
    /// Only engine initialization failures are worth retrying with the same inputs.
    pub fn retryable(&self) -> bool {
        self.kind == FailureKind::EngineUnavailable
    }
}

/// Classify an error raised anywhere inside a job.
pub fn classify(err: &ComposeError) -> JobFailure {
    let (kind, detail) = match err {
        ComposeError::EngineUnavailable { .. } => (
            FailureKind::EngineUnavailable,
            "the media engine could not be started; try again",
        ),
        ComposeError::EmptyOutput { .. } => (
            FailureKind::EmptyOutput,
            "the result was empty; the two clips probably differ in resolution or codec",
        ),
        ComposeError::ResolutionMismatch { .. } => (
            FailureKind::EngineExecutionError,
            "the two clips have different resolutions; re-export one so both share the same height",
        ),
        ComposeError::FileNotFound { .. }
        | ComposeError::InvalidInput { .. }
        | ComposeError::Io(_) => (
            FailureKind::EngineExecutionError,
            "a required file could not be read or written; check the label font and workspace paths",
        ),
        ComposeError::EngineExecution { .. }
        | ComposeError::OutputNotFound { .. }
        | ComposeError::Json(_)
        | ComposeError::Other(_) => (
            FailureKind::EngineExecutionError,
            "the clips could not be processed; they may use an unsupported codec or be corrupt",
        ),
    };

    JobFailure {
        kind,
        message: MESSAGE.to_string(),
        detail: detail.to_string(),
        cause: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_output_classification() {
        let failure = classify(&ComposeError::empty_output("output.mp4"));
        assert_eq!(failure.kind, FailureKind::EmptyOutput);
        assert!(failure.detail.contains("resolution"));
        assert!(!failure.retryable());
    }

    #[test]
    fn test_engine_failure_classification() {
        let failure = classify(&ComposeError::engine_execution(
            "Invalid data found when processing input",
        ));
        assert_eq!(failure.kind, FailureKind::EngineExecutionError);
        assert!(failure.detail.contains("codec"));
        assert!(failure.cause.contains("Invalid data"));
    }

    #[test]
    fn test_resolution_mismatch_gets_its_own_detail() {
        let failure = classify(&ComposeError::resolution_mismatch(
            "Input 1 height 1080 does not match input 0 height 480",
        ));
        assert_eq!(failure.kind, FailureKind::EngineExecutionError);
        assert!(failure.detail.contains("resolution"));
        assert!(!failure.detail.contains("corrupt"));
        assert!(failure.cause.contains("height 1080"));
        assert!(!failure.retryable());
    }

    #[test]
    fn test_missing_font_is_not_blamed_on_the_clips() {
        let failure = classify(&ComposeError::FileNotFound {
            path: "/usr/share/fonts/label_font.ttf".into(),
        });
        assert_eq!(failure.kind, FailureKind::EngineExecutionError);
        assert!(failure.detail.contains("font"));
        assert!(!failure.detail.contains("codec"));
    }

    #[test]
    fn test_output_not_found_reads_as_execution_error() {
        let failure = classify(&ComposeError::output_not_found("output.gif"));
        assert_eq!(failure.kind, FailureKind::EngineExecutionError);
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        let failure = classify(&ComposeError::engine_unavailable("ffmpeg missing"));
        assert_eq!(failure.kind, FailureKind::EngineUnavailable);
        assert!(failure.retryable());
    }

    #[test]
    fn test_messages_share_a_family() {
        let a = classify(&ComposeError::empty_output("output.gif"));
        let b = classify(&ComposeError::engine_execution("boom"));
        assert_eq!(a.message, b.message);
        assert_ne!(a.detail, b.detail);
        assert!(a.to_string().starts_with("Failed to generate output: "));
    }
}

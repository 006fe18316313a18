//! Error types shared across SideBySide crates.

use std::path::PathBuf;

/// Top-level error type for SideBySide operations.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Engine unavailable: {message}")]
    EngineUnavailable { message: String },

    #[error("Engine execution failed: {message}")]
    EngineExecution { message: String },

    #[error("Clip resolutions do not match: {message}")]
    ResolutionMismatch { message: String },

    #[error("Engine produced an empty output: {name}")]
    EmptyOutput { name: String },

    #[error("Output not found in workspace: {name}")]
    OutputNotFound { name: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ComposeError.
pub type ComposeResult<T> = Result<T, ComposeError>;

impl ComposeError {
    pub fn engine_unavailable(msg: impl Into<String>) -> Self {
        Self::EngineUnavailable {
            message: msg.into(),
        }
    }

    pub fn engine_execution(msg: impl Into<String>) -> Self {
        Self::EngineExecution {
            message: msg.into(),
        }
    }

    pub fn empty_output(name: impl Into<String>) -> Self {
        Self::EmptyOutput { name: name.into() }
    }

    pub fn output_not_found(name: impl Into<String>) -> Self {
        Self::OutputNotFound { name: name.into() }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn resolution_mismatch(msg: impl Into<String>) -> Self {
        Self::ResolutionMismatch {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = ComposeError::engine_execution("Invalid data found when processing input");
        assert_eq!(
            err.to_string(),
            "Engine execution failed: Invalid data found when processing input"
        );

        let err = ComposeError::empty_output("output.gif");
        assert!(err.to_string().contains("output.gif"));
    }

    #[test]
    fn test_io_error_converts() {
        fn read_missing() -> ComposeResult<Vec<u8>> {
            Ok(std::fs::read("/definitely/not/here/sidebyside")?)
        }
        assert!(matches!(read_missing(), Err(ComposeError::Io(_))));
    }
}

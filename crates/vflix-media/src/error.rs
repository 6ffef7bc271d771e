//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("{tool} failed: {message}")]
    ExternalTool {
        tool: String,
        message: String,
        exit_code: Option<i32>,
        stderr: Option<String>,
    },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Artifact does not exist: {0}")]
    MissingArtifact(PathBuf),

    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create an external tool failure error.
    pub fn external_tool(
        tool: impl Into<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
        stderr: Option<String>,
    ) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.into(),
            exit_code,
            stderr,
        }
    }

    /// Create an invalid path error.
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::InvalidPath(message.into())
    }

    /// Exit code reported by the external tool, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            MediaError::ExternalTool { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Whether running the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::ExternalTool { .. } | MediaError::Timeout(_) | MediaError::Io(_)
        )
    }
}

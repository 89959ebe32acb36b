//! Error types shared across Reframe crates.

use std::path::PathBuf;

/// Top-level error type for Reframe operations.
#[derive(Debug, thiserror::Error)]
pub enum ReframeError {
    #[error("Analysis error: {message}")]
    Analysis { message: String },

    #[error("Detection error: {message}")]
    Detection { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Project error: {message}")]
    Project { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReframeError.
pub type ReframeResult<T> = Result<T, ReframeError>;

impl ReframeError {
    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis {
            message: msg.into(),
        }
    }

    pub fn detection(msg: impl Into<String>) -> Self {
        Self::Detection {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn project(msg: impl Into<String>) -> Self {
        Self::Project {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_format_messages() {
        let err = ReframeError::render("ffmpeg exited with status 1");
        assert_eq!(err.to_string(), "Render error: ffmpeg exited with status 1");

        let err = ReframeError::unsupported("no media engine");
        assert!(matches!(err, ReframeError::Unsupported { .. }));
    }

    #[test]
    fn test_io_error_converts() {
        fn open_missing() -> ReframeResult<String> {
            Ok(std::fs::read_to_string("/definitely/not/here.json")?)
        }
        assert!(matches!(open_missing(), Err(ReframeError::Io(_))));
    }
}

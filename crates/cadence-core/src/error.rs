//! Error types for the analysis engine

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by individual pipeline stages and analyzers
///
/// Failures of the primary analyzer are recovered by the selector and only
/// ever show up in logs and `analysis_metadata.fallback_reason`.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("{analyzer} analyzer exceeded {limit:?} (took {elapsed:?})")]
    Timeout {
        analyzer: &'static str,
        elapsed: Duration,
        limit: Duration,
    },

    #[error("Analyzer unavailable: {0}")]
    Unavailable(String),

    #[error("Analyzer initialization failed: {0}")]
    InitFailed(String),

    #[error("Analysis backend error: {0}")]
    Backend(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AnalysisError {
    pub(crate) fn decode(path: &Path, reason: impl Into<String>) -> Self {
        AnalysisError::Decode {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AnalysisError::Timeout { .. })
    }
}

/// The only error the engine surfaces to callers
///
/// Raised when the file cannot be decoded at all, or when every available
/// analyzer failed on the same request.
#[derive(Error, Debug)]
#[error("Audio analysis failed for {path}: {message}")]
pub struct AudioError {
    pub path: PathBuf,
    pub message: String,
    #[source]
    pub source: Option<AnalysisError>,
}

impl AudioError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, source: Option<AnalysisError>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Wrap a stage error, reusing its display text as the message
    pub fn from_analysis(path: impl Into<PathBuf>, source: AnalysisError) -> Self {
        Self {
            path: path.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// Result type for stage-level operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_audio_error_keeps_source() {
        let err = AudioError::from_analysis(
            "kick.wav",
            AnalysisError::decode(Path::new("kick.wav"), "no audio frames"),
        );
        assert!(err.to_string().contains("kick.wav"));
        assert!(err.source().is_some());
        assert!(matches!(err.source, Some(AnalysisError::Decode { .. })));
    }

    #[test]
    fn test_timeout_detection() {
        let err = AnalysisError::Timeout {
            analyzer: "essentia",
            elapsed: Duration::from_secs(31),
            limit: Duration::from_secs(30),
        };
        assert!(err.is_timeout());
        assert!(!AnalysisError::Backend("boom".into()).is_timeout());
    }
}

//! Error types for the segmentation worker.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during segmentation.
#[derive(Debug, Error)]
pub enum SegmenterError {
    /// Media toolkit binary (ffmpeg/ffprobe) not found.
    #[error("media toolkit not found at path: {path}")]
    ToolkitNotFound { path: PathBuf },

    /// Input file not found.
    #[error("input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Detected container/codec is not in the supported set.
    #[error("unsupported input format: {format}")]
    UnsupportedFormat { format: String },

    /// The toolkit exited non-zero, produced no output from non-empty input,
    /// or the workspace is inconsistent with the committed manifest.
    #[error("transcode failed: {reason}")]
    TranscodeFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// Segmentation exceeded its wall-clock budget; the process was killed.
    #[error("segmentation timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Failed to probe the media file.
    #[error("failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// Failed to parse toolkit output.
    #[error("failed to parse toolkit output: {reason}")]
    ParseError { reason: String },

    /// I/O error during segmentation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SegmenterError {
    /// Creates a new transcode failed error with stderr output.
    pub fn transcode_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::TranscodeFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }
}

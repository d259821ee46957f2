//! Error types for the acquisition worker.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while fetching a remote source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Downloader binary not found.
    #[error("downloader not found at path: {path}")]
    DownloaderNotFound { path: PathBuf },

    /// Non-retryable failure: malformed URL, unsupported source, or a
    /// 4xx-equivalent rejection from the origin.
    #[error("unrecoverable fetch: {reason}")]
    Unrecoverable { reason: String },

    /// The downloader reported success but the output file is empty.
    #[error("downloaded file is empty: {path}")]
    EmptyDownload { path: PathBuf },

    /// One attempt exceeded its wall-clock budget; the process was killed.
    /// Counted as transient.
    #[error("fetch attempt timed out after {timeout_secs} seconds")]
    AttemptTimeout { timeout_secs: u64 },

    /// Retryable failure: network error or 5xx-equivalent.
    #[error("transient fetch error: {reason}")]
    Transient { reason: String },

    /// The retry budget ran out on transient failures.
    #[error("fetch failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// I/O error while talking to the subprocess or scanning output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether the owning worker should retry this error locally.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AttemptTimeout { .. } | Self::Transient { .. } | Self::Io(_)
        )
    }
}

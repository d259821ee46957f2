//! Mock fetcher for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::fetcher::{FetchError, FetchedMedia, Fetcher};

/// A recorded fetch call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    /// Source that was requested.
    pub source: String,
    /// Destination directory the fetch was pointed at.
    pub dest_dir: PathBuf,
}

/// Scripted failure outcomes. Cloneable stand-ins for [`FetchError`], which
/// carries non-cloneable payloads.
#[derive(Debug, Clone)]
pub enum MockFetchFailure {
    /// Non-retryable failure.
    Unrecoverable(String),
    /// The retry budget ran out.
    RetriesExhausted { attempts: u32, last_error: String },
    /// Downloaded file was empty.
    EmptyDownload,
}

impl MockFetchFailure {
    fn into_error(self, dest_dir: &Path) -> FetchError {
        match self {
            MockFetchFailure::Unrecoverable(reason) => FetchError::Unrecoverable { reason },
            MockFetchFailure::RetriesExhausted {
                attempts,
                last_error,
            } => FetchError::RetriesExhausted {
                attempts,
                last_error,
            },
            MockFetchFailure::EmptyDownload => FetchError::EmptyDownload {
                path: dest_dir.join("source.mp3"),
            },
        }
    }
}

/// Mock implementation of the Fetcher trait.
///
/// Provides controllable behavior for testing:
/// - Track fetch calls for assertions
/// - Script success/failure outcomes
/// - Simulate slow fetches (for cancellation tests)
pub struct MockFetcher {
    /// Recorded fetches.
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
    /// If set, every fetch fails with this outcome.
    fail_with: Arc<RwLock<Option<MockFetchFailure>>>,
    /// Bytes written as the downloaded file on success.
    file_contents: Arc<RwLock<Vec<u8>>>,
    /// Simulated fetch duration.
    delay: Arc<RwLock<Duration>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    /// Create a new mock fetcher that succeeds immediately.
    pub fn new() -> Self {
        Self {
            fetches: Arc::new(RwLock::new(Vec::new())),
            fail_with: Arc::new(RwLock::new(None)),
            file_contents: Arc::new(RwLock::new(b"mock media bytes".to_vec())),
            delay: Arc::new(RwLock::new(Duration::from_millis(0))),
        }
    }

    /// Get all recorded fetches.
    pub async fn recorded_fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    /// Get the number of fetches performed.
    pub async fn fetch_count(&self) -> usize {
        self.fetches.read().await.len()
    }

    /// Make every subsequent fetch fail with the given outcome.
    pub async fn set_failure(&self, failure: MockFetchFailure) {
        *self.fail_with.write().await = Some(failure);
    }

    /// Clear a scripted failure.
    pub async fn clear_failure(&self) {
        *self.fail_with.write().await = None;
    }

    /// Set the bytes written as the downloaded file.
    pub async fn set_file_contents(&self, contents: Vec<u8>) {
        *self.file_contents.write().await = contents;
    }

    /// Set the simulated fetch duration.
    pub async fn set_fetch_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<FetchedMedia, FetchError> {
        self.fetches.write().await.push(RecordedFetch {
            source: source.to_string(),
            dest_dir: dest_dir.to_path_buf(),
        });

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = self.fail_with.read().await.clone() {
            return Err(failure.into_error(dest_dir));
        }

        let contents = self.file_contents.read().await.clone();
        let path = dest_dir.join("source.mp3");
        tokio::fs::write(&path, &contents).await?;

        if contents.is_empty() {
            return Err(FetchError::EmptyDownload { path });
        }

        Ok(FetchedMedia {
            size_bytes: contents.len() as u64,
            path,
        })
    }
}

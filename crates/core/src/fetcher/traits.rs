//! Fetcher trait.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::error::FetchError;

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    /// Local path of the downloaded file inside the downloads workspace.
    pub path: PathBuf,
    /// Size in bytes, guaranteed non-zero.
    pub size_bytes: u64,
}

/// Acquires a remote source into a local workspace.
///
/// Implementations own their retry and timeout policy; transient failures
/// never surface to callers, only terminal outcomes do.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns the fetcher implementation name.
    fn name(&self) -> &str;

    /// Fetch `source` into `dest_dir`, returning the downloaded file.
    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<FetchedMedia, FetchError>;
}

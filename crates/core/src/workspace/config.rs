//! Configuration for the storage layout manager.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The three working roots of the pipeline, pre-created by the deployment
/// environment, plus the free-space floor enforced on allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for uploaded source files.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Root for produced segments.
    #[serde(default = "default_segments_dir")]
    pub segments_dir: PathBuf,

    /// Root for downloader output.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,

    /// Minimum available bytes required on the hosting filesystem before a
    /// new workspace may be allocated. 0 disables the check.
    #[serde(default = "default_min_free_bytes")]
    pub min_free_bytes: u64,
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("data/uploads")
}

fn default_segments_dir() -> PathBuf {
    PathBuf::from("data/segments")
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("data/downloads")
}

fn default_min_free_bytes() -> u64 {
    512 * 1024 * 1024 // 512 MiB
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            segments_dir: default_segments_dir(),
            downloads_dir: default_downloads_dir(),
            min_free_bytes: default_min_free_bytes(),
        }
    }
}

//! Configuration for the acquisition worker.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the downloader-based fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Path to the downloader binary.
    #[serde(default = "default_downloader_path")]
    pub downloader_path: PathBuf,

    /// Maximum attempts per fetch, counting the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wall-clock budget for a single attempt in seconds.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Base delay of the exponential backoff between attempts, milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Optional download rate limit passed to the downloader (e.g. "4M").
    #[serde(default)]
    pub max_rate: Option<String>,

    /// Additional downloader arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_downloader_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout() -> u64 {
    600 // 10 minutes
}

fn default_backoff_base_ms() -> u64 {
    500
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            downloader_path: default_downloader_path(),
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout(),
            backoff_base_ms: default_backoff_base_ms(),
            max_rate: None,
            extra_args: Vec::new(),
        }
    }
}

impl FetcherConfig {
    /// Sets the downloader binary path.
    pub fn with_downloader_path(mut self, path: PathBuf) -> Self {
        self.downloader_path = path;
        self
    }

    /// Sets the attempt budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the per-attempt timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.attempt_timeout_secs = timeout_secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FetcherConfig::default();
        assert_eq!(config.downloader_path, PathBuf::from("yt-dlp"));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.attempt_timeout_secs, 600);
        assert!(config.max_rate.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            downloader_path = "/usr/local/bin/yt-dlp"
            max_attempts = 5
            max_rate = "2M"
        "#;
        let config: FetcherConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.downloader_path, PathBuf::from("/usr/local/bin/yt-dlp"));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.max_rate.as_deref(), Some("2M"));
        assert_eq!(config.attempt_timeout_secs, 600);
    }

    #[test]
    fn test_config_builder() {
        let config = FetcherConfig::default()
            .with_downloader_path(PathBuf::from("/opt/yt-dlp"))
            .with_max_attempts(1)
            .with_timeout(30);
        assert_eq!(config.downloader_path, PathBuf::from("/opt/yt-dlp"));
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.attempt_timeout_secs, 30);
    }
}

//! yt-dlp based fetcher implementation.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

use crate::metrics;

use super::config::FetcherConfig;
use super::error::FetchError;
use super::traits::{FetchedMedia, Fetcher};

/// Partial-download suffixes the downloader leaves behind while running.
const PARTIAL_SUFFIXES: [&str; 3] = [".part", ".ytdl", ".temp"];

/// Stderr markers for failures that retrying cannot fix.
const UNRECOVERABLE_MARKERS: [&str; 7] = [
    "Unsupported URL",
    "is not a valid URL",
    "Video unavailable",
    "Private video",
    "This video is not available",
    "HTTP Error 4",
    "Requested format is not available",
];

/// Fetcher that shells out to yt-dlp (or a compatible downloader).
pub struct YtDlpFetcher {
    config: FetcherConfig,
}

impl YtDlpFetcher {
    /// Creates a new fetcher with the given configuration.
    pub fn new(config: FetcherConfig) -> Self {
        Self { config }
    }

    /// Creates a fetcher with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(FetcherConfig::default())
    }

    /// Builds downloader arguments for one attempt.
    fn build_args(&self, source: &str, dest_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "-f".to_string(),
            "bestaudio/best".to_string(),
            "--newline".to_string(),
            "-o".to_string(),
            dest_dir.join("source.%(ext)s").to_string_lossy().to_string(),
        ];

        if let Some(ref rate) = self.config.max_rate {
            args.extend(["-r".to_string(), rate.clone()]);
        }

        args.extend(self.config.extra_args.iter().cloned());
        args.push(source.to_string());
        args
    }

    /// Classifies a failed attempt from its stderr output.
    fn classify_failure(stderr: &str) -> FetchError {
        if UNRECOVERABLE_MARKERS.iter().any(|m| stderr.contains(m)) {
            FetchError::Unrecoverable {
                reason: Self::error_summary(stderr),
            }
        } else {
            FetchError::Transient {
                reason: Self::error_summary(stderr),
            }
        }
    }

    /// Extracts the most relevant error line from downloader stderr.
    fn error_summary(stderr: &str) -> String {
        stderr
            .lines()
            .rev()
            .find(|l| l.contains("ERROR"))
            .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
            .unwrap_or("downloader exited non-zero")
            .trim()
            .to_string()
    }

    /// Finds the single media file the downloader left in `dest_dir`.
    fn scan_output(dest_dir: &Path) -> Result<FetchedMedia, FetchError> {
        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(dest_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                continue;
            }
            candidates.push(entry.path());
        }

        match candidates.len() {
            0 => Err(FetchError::Unrecoverable {
                reason: "downloader exited successfully but produced no output file".to_string(),
            }),
            1 => {
                let path = candidates.remove(0);
                let size_bytes = std::fs::metadata(&path)?.len();
                if size_bytes == 0 {
                    return Err(FetchError::EmptyDownload { path });
                }
                Ok(FetchedMedia { path, size_bytes })
            }
            n => Err(FetchError::Unrecoverable {
                reason: format!("downloader left {n} files in destination, expected exactly one"),
            }),
        }
    }

    /// Runs a single downloader attempt with a wall-clock timeout.
    async fn run_once(&self, source: &str, dest_dir: &Path) -> Result<FetchedMedia, FetchError> {
        let args = self.build_args(source, dest_dir);
        debug!(downloader = %self.config.downloader_path.display(), ?args, "spawning downloader");

        let mut child = Command::new(&self.config.downloader_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FetchError::DownloaderNotFound {
                        path: self.config.downloader_path.clone(),
                    }
                } else {
                    FetchError::Io(e)
                }
            })?;

        let stderr = child.stderr.take().expect("stderr should be captured");
        let mut reader = BufReader::new(stderr).lines();

        let timeout_duration = Duration::from_secs(self.config.attempt_timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut captured = String::new();
            while let Ok(Some(line)) = reader.next_line().await {
                if line.contains("ERROR") || line.contains("WARNING") {
                    captured.push_str(&line);
                    captured.push('\n');
                }
            }
            let status = child.wait().await?;
            Ok::<(std::process::ExitStatus, String), std::io::Error>((status, captured))
        })
        .await;

        match result {
            Ok(Ok((status, captured))) => {
                if !status.success() {
                    return Err(Self::classify_failure(&captured));
                }
                Self::scan_output(dest_dir)
            }
            Ok(Err(e)) => Err(FetchError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                Err(FetchError::AttemptTimeout {
                    timeout_secs: self.config.attempt_timeout_secs,
                })
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.backoff_base_ms << (attempt - 1).min(10))
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<FetchedMedia, FetchError> {
        if !source.starts_with("http://") && !source.starts_with("https://") {
            return Err(FetchError::Unrecoverable {
                reason: format!("unsupported source scheme: {source}"),
            });
        }

        let timer = metrics::FETCH_DURATION.start_timer();
        let mut last_error: Option<FetchError> = None;

        for attempt in 1..=self.config.max_attempts.max(1) {
            match self.run_once(source, dest_dir).await {
                Ok(media) => {
                    metrics::FETCH_ATTEMPTS
                        .with_label_values(&["success"])
                        .inc();
                    timer.observe_duration();
                    debug!(
                        source,
                        path = %media.path.display(),
                        size_bytes = media.size_bytes,
                        attempt,
                        "fetch succeeded"
                    );
                    return Ok(media);
                }
                Err(e) if e.is_transient() => {
                    metrics::FETCH_ATTEMPTS
                        .with_label_values(&["transient"])
                        .inc();
                    warn!(source, attempt, error = %e, "transient fetch failure");
                    last_error = Some(e);
                    if attempt < self.config.max_attempts {
                        sleep(self.backoff_delay(attempt)).await;
                    }
                }
                Err(e) => {
                    metrics::FETCH_ATTEMPTS
                        .with_label_values(&["unrecoverable"])
                        .inc();
                    timer.observe_duration();
                    return Err(e);
                }
            }
        }

        timer.observe_duration();
        Err(FetchError::RetriesExhausted {
            attempts: self.config.max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

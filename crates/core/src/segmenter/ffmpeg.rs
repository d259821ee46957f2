//! FFmpeg-based segmenter implementation.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::ledger::SegmentDescriptor;
use crate::metrics;

use super::config::SegmenterConfig;
use super::error::SegmenterError;
use super::traits::Segmenter;
use super::types::MediaInfo;

/// FFmpeg-based segmenter implementation.
pub struct FfmpegSegmenter {
    config: SegmenterConfig,
}

impl FfmpegSegmenter {
    /// Creates a new segmenter with the given configuration.
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Creates a segmenter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(SegmenterConfig::default())
    }

    /// Verifies the toolkit binaries are reachable.
    pub async fn validate(&self) -> Result<(), SegmenterError> {
        for path in [&self.config.ffmpeg_path, &self.config.ffprobe_path] {
            let result = Command::new(path).arg("-version").output().await;
            if let Err(e) = result {
                if e.kind() == std::io::ErrorKind::NotFound {
                    return Err(SegmenterError::ToolkitNotFound { path: path.clone() });
                }
                return Err(SegmenterError::Io(e));
            }
        }
        Ok(())
    }

    /// Zero-padded segment file name for a sequence index.
    fn segment_file_name(seq: u32, extension: &str) -> String {
        format!("part-{seq:05}.{extension}")
    }

    /// Builds ffmpeg arguments for the segmenting invocation.
    ///
    /// `offset_secs` skips input already covered by committed segments;
    /// `boundaries` switches from fixed-duration to explicit cut times
    /// (relative to the offset).
    fn build_segment_args(
        &self,
        input: &Path,
        out_dir: &Path,
        resume_from: u32,
        offset_secs: f64,
        boundaries: Option<&[f64]>,
    ) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ];

        // Output-side seek: accurate, decodes and discards the prefix.
        if offset_secs > 0.0 {
            args.extend(["-ss".to_string(), format!("{offset_secs:.3}")]);
        }

        args.extend([
            "-vn".to_string(),
            "-c:a".to_string(),
            self.config.audio_codec.clone(),
        ]);

        if let Some(rate) = self.config.sample_rate_hz {
            args.extend(["-ar".to_string(), rate.to_string()]);
        }
        if let Some(channels) = self.config.channels {
            args.extend(["-ac".to_string(), channels.to_string()]);
        }

        args.extend(["-f".to_string(), "segment".to_string()]);

        match boundaries {
            Some(times) if !times.is_empty() => {
                let joined = times
                    .iter()
                    .map(|t| format!("{t:.3}"))
                    .collect::<Vec<_>>()
                    .join(",");
                args.extend(["-segment_times".to_string(), joined]);
            }
            _ => {
                args.extend([
                    "-segment_time".to_string(),
                    self.config.segment_secs.to_string(),
                ]);
            }
        }

        args.extend([
            "-segment_start_number".to_string(),
            resume_from.to_string(),
            "-reset_timestamps".to_string(),
            "1".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
        ]);

        args.push(
            out_dir
                .join(format!("part-%05d.{}", self.config.output_extension))
                .to_string_lossy()
                .to_string(),
        );

        args
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, SegmenterError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
            size: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| SegmenterError::ParseError {
                reason: format!("failed to parse ffprobe output: {e}"),
            })?;

        let duration_secs = probe
            .format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let size_bytes = probe
            .format
            .size
            .as_ref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let codec_of = |kind: &str| {
            probe
                .streams
                .iter()
                .find(|s| s.codec_type == kind)
                .and_then(|s| s.codec_name.clone())
        };

        let format = probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown")
            .to_string();

        Ok(MediaInfo {
            path: path.to_path_buf(),
            format,
            duration_secs,
            size_bytes,
            audio_codec: codec_of("audio"),
            video_codec: codec_of("video"),
        })
    }

    /// Rejects inputs whose container and codecs are all outside the
    /// supported set.
    fn check_supported(&self, info: &MediaInfo) -> Result<(), SegmenterError> {
        let supported = &self.config.supported_formats;
        let known = |name: &str| supported.iter().any(|s| s == name);

        if known(&info.format)
            || info.audio_codec.as_deref().is_some_and(known)
            || info.video_codec.as_deref().is_some_and(known)
        {
            return Ok(());
        }

        Err(SegmenterError::UnsupportedFormat {
            format: match &info.audio_codec {
                Some(codec) => format!("{}/{}", info.format, codec),
                None => info.format.clone(),
            },
        })
    }

    /// Lists `part-NNNNN.<ext>` files in the workspace, sorted by index.
    fn scan_existing(
        out_dir: &Path,
        extension: &str,
    ) -> Result<Vec<(u32, PathBuf)>, SegmenterError> {
        let pattern = Regex::new(&format!(r"^part-(\d{{5}})\.{extension}$"))
            .map_err(|e| SegmenterError::ParseError {
                reason: format!("bad segment pattern: {e}"),
            })?;

        let mut found = Vec::new();
        for entry in std::fs::read_dir(out_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(caps) = pattern.captures(&name) {
                if let Ok(seq) = caps[1].parse::<u32>() {
                    found.push((seq, entry.path()));
                }
            }
        }
        found.sort_by_key(|(seq, _)| *seq);
        Ok(found)
    }

    /// Reconciles the workspace with the committed manifest before invoking
    /// the toolkit: uncommitted leftovers are deleted, committed output must
    /// be complete on disk.
    ///
    /// Returns the committed segment files, in sequence order.
    fn reconcile_workspace(
        out_dir: &Path,
        resume_from: u32,
        extension: &str,
    ) -> Result<Vec<PathBuf>, SegmenterError> {
        let existing = Self::scan_existing(out_dir, extension)?;

        let mut confirmed = vec![None; resume_from as usize];
        for (seq, path) in existing {
            if seq < resume_from {
                confirmed[seq as usize] = Some(path);
            } else {
                debug!(path = %path.display(), "removing uncommitted segment leftover");
                std::fs::remove_file(&path)?;
            }
        }

        confirmed
            .into_iter()
            .enumerate()
            .map(|(seq, path)| {
                path.ok_or_else(|| {
                    SegmenterError::transcode_failed(
                        format!(
                            "workspace is missing committed segment {}",
                            Self::segment_file_name(seq as u32, extension)
                        ),
                        None,
                    )
                })
            })
            .collect()
    }

    /// Parses `silence_start:` timestamps from a silencedetect pass.
    fn parse_silence_starts(stderr: &str) -> Vec<f64> {
        let pattern = match Regex::new(r"silence_start: (-?\d+(?:\.\d+)?)") {
            Ok(p) => p,
            Err(_) => return Vec::new(),
        };
        stderr
            .lines()
            .filter_map(|line| {
                pattern
                    .captures(line)
                    .and_then(|caps| caps[1].parse::<f64>().ok())
            })
            .filter(|t| *t > 0.0)
            .collect()
    }

    /// Picks cut points from silence onsets: the first onset at least
    /// `target_secs` after the previous cut, dropping anything at or past the
    /// end of the input.
    fn plan_boundaries(silence_starts: &[f64], target_secs: f64, total_secs: f64) -> Vec<f64> {
        let mut boundaries = Vec::new();
        let mut last_cut = 0.0;
        for &start in silence_starts {
            if start >= total_secs {
                break;
            }
            if start - last_cut >= target_secs {
                boundaries.push(start);
                last_cut = start;
            }
        }
        boundaries
    }

    /// Runs ffmpeg, capturing stderr, with a wall-clock timeout.
    async fn run_ffmpeg(
        &self,
        args: &[String],
    ) -> Result<(std::process::ExitStatus, String), SegmenterError> {
        debug!(ffmpeg = %self.config.ffmpeg_path.display(), ?args, "spawning toolkit");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SegmenterError::ToolkitNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    SegmenterError::Io(e)
                }
            })?;

        let stderr = child.stderr.take().expect("stderr should be captured");
        let mut reader = BufReader::new(stderr).lines();

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut captured = String::new();
            while let Ok(Some(line)) = reader.next_line().await {
                captured.push_str(&line);
                captured.push('\n');
            }
            let status = child.wait().await?;
            Ok::<(std::process::ExitStatus, String), std::io::Error>((status, captured))
        })
        .await;

        match result {
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(e)) => Err(SegmenterError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                Err(SegmenterError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
        }
    }

    /// Runs a silencedetect pass and plans cut points past `offset_secs`.
    async fn plan_silence_cuts(
        &self,
        input: &Path,
        total_secs: f64,
        offset_secs: f64,
    ) -> Result<Option<Vec<f64>>, SegmenterError> {
        let silence = match &self.config.silence {
            Some(s) => s,
            None => return Ok(None),
        };

        let filter = format!(
            "silencedetect=noise={}dB:d={}",
            silence.noise_db, silence.min_silence_secs
        );
        let args = vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-af".to_string(),
            filter,
            "-f".to_string(),
            "null".to_string(),
            // silencedetect reports at info level
            "-loglevel".to_string(),
            "info".to_string(),
            "-".to_string(),
        ];

        let (status, stderr) = self.run_ffmpeg(&args).await?;
        if !status.success() {
            return Err(SegmenterError::transcode_failed(
                "silence detection pass failed",
                Some(stderr),
            ));
        }

        let starts = Self::parse_silence_starts(&stderr);
        let boundaries =
            Self::plan_boundaries(&starts, self.config.segment_secs as f64, total_secs);

        // Shift past already-committed output; an empty plan falls back to
        // fixed-duration cuts.
        let relative: Vec<f64> = boundaries
            .into_iter()
            .filter(|b| *b > offset_secs)
            .map(|b| b - offset_secs)
            .collect();

        if relative.is_empty() {
            warn!(input = %input.display(), "no usable silence boundaries, using fixed cuts");
            Ok(None)
        } else {
            Ok(Some(relative))
        }
    }

    async fn checksum_file(path: &Path) -> Result<String, SegmenterError> {
        let bytes = tokio::fs::read(path).await?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }
}

#[async_trait]
impl Segmenter for FfmpegSegmenter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, SegmenterError> {
        if !path.exists() {
            return Err(SegmenterError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SegmenterError::ToolkitNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    SegmenterError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(SegmenterError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }

    async fn segment(
        &self,
        input: &Path,
        out_dir: &Path,
        resume_from: u32,
    ) -> Result<Vec<SegmentDescriptor>, SegmenterError> {
        let timer = metrics::SEGMENTATION_DURATION.start_timer();

        let meta = tokio::fs::metadata(input)
            .await
            .map_err(|_| SegmenterError::InputNotFound {
                path: input.to_path_buf(),
            })?;
        if meta.len() == 0 {
            return Err(SegmenterError::transcode_failed(
                format!("input file is empty: {}", input.display()),
                None,
            ));
        }

        let info = self.probe(input).await?;
        self.check_supported(&info)?;

        let extension = self.config.output_extension.clone();
        let confirmed = Self::reconcile_workspace(out_dir, resume_from, &extension)?;

        let mut offset_secs = 0.0;
        for path in &confirmed {
            offset_secs += self.probe(path).await?.duration_secs;
        }

        let boundaries = self
            .plan_silence_cuts(input, info.duration_secs, offset_secs)
            .await?;

        let args = self.build_segment_args(
            input,
            out_dir,
            resume_from,
            offset_secs,
            boundaries.as_deref(),
        );

        let (status, stderr) = self.run_ffmpeg(&args).await?;
        if !status.success() {
            return Err(SegmenterError::transcode_failed(
                format!("toolkit exited with code {:?}", status.code()),
                if stderr.is_empty() { None } else { Some(stderr) },
            ));
        }

        let produced: Vec<(u32, PathBuf)> = Self::scan_existing(out_dir, &extension)?
            .into_iter()
            .filter(|(seq, _)| *seq >= resume_from)
            .collect();

        if produced.is_empty() && resume_from == 0 {
            return Err(SegmenterError::transcode_failed(
                "toolkit produced zero segments from non-empty input",
                if stderr.is_empty() { None } else { Some(stderr) },
            ));
        }

        let mut descriptors = Vec::with_capacity(produced.len());
        for (idx, (seq, path)) in produced.iter().enumerate() {
            // The toolkit numbers outputs sequentially; a hole here means it
            // misbehaved and the manifest invariant cannot be kept.
            let expected = resume_from + idx as u32;
            if *seq != expected {
                return Err(SegmenterError::transcode_failed(
                    format!("non-contiguous segment output: expected {expected}, found {seq}"),
                    None,
                ));
            }

            let seg_meta = tokio::fs::metadata(path).await?;
            let seg_info = self.probe(path).await?;
            descriptors.push(SegmentDescriptor {
                seq: *seq,
                path: path.clone(),
                duration_secs: seg_info.duration_secs,
                size_bytes: seg_meta.len(),
                checksum: Self::checksum_file(path).await?,
            });
        }

        metrics::SEGMENTS_EMITTED.inc_by(descriptors.len() as u64);
        timer.observe_duration();

        Ok(descriptors)
    }
}

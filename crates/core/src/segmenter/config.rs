//! Configuration for the segmentation worker.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Silence-aware cut policy. When present, segment boundaries snap to
/// detected silence onsets instead of fixed offsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilenceConfig {
    /// Noise floor in dB below which audio counts as silence.
    #[serde(default = "default_noise_db")]
    pub noise_db: f32,

    /// Minimum silence duration in seconds for a detection.
    #[serde(default = "default_min_silence")]
    pub min_silence_secs: f64,
}

fn default_noise_db() -> f32 {
    -30.0
}

fn default_min_silence() -> f64 {
    0.5
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            noise_db: default_noise_db(),
            min_silence_secs: default_min_silence(),
        }
    }
}

/// Configuration for the ffmpeg-based segmenter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Target duration of a segment in seconds.
    #[serde(default = "default_segment_secs")]
    pub segment_secs: u32,

    /// Optional silence-aware cut policy.
    #[serde(default)]
    pub silence: Option<SilenceConfig>,

    /// Wall-clock budget for one toolkit invocation in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Audio codec for emitted segments.
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// File extension of emitted segments.
    #[serde(default = "default_output_extension")]
    pub output_extension: String,

    /// Output sample rate, when resampling is wanted.
    #[serde(default)]
    pub sample_rate_hz: Option<u32>,

    /// Output channel count, when downmixing is wanted.
    #[serde(default)]
    pub channels: Option<u8>,

    /// Containers/codecs accepted as input.
    #[serde(default = "default_supported_formats")]
    pub supported_formats: Vec<String>,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_segment_secs() -> u32 {
    60
}

fn default_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_audio_codec() -> String {
    "libmp3lame".to_string()
}

fn default_output_extension() -> String {
    "mp3".to_string()
}

fn default_supported_formats() -> Vec<String> {
    [
        "mp3", "aac", "m4a", "mov", "mp4", "matroska", "webm", "wav", "flac", "ogg", "opus",
        "vorbis", "h264", "hevc", "pcm_s16le",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_log_level() -> String {
    "warning".to_string()
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            segment_secs: default_segment_secs(),
            silence: None,
            timeout_secs: default_timeout(),
            audio_codec: default_audio_codec(),
            output_extension: default_output_extension(),
            sample_rate_hz: None,
            channels: None,
            supported_formats: default_supported_formats(),
            ffmpeg_log_level: default_log_level(),
        }
    }
}

impl SegmenterConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Sets the target segment duration.
    pub fn with_segment_secs(mut self, secs: u32) -> Self {
        self.segment_secs = secs;
        self
    }

    /// Enables the silence-aware cut policy.
    pub fn with_silence(mut self, silence: SilenceConfig) -> Self {
        self.silence = Some(silence);
        self
    }
}

//! Types produced by media probing.

use std::path::PathBuf;

/// What ffprobe reports about a media file, trimmed to what segmentation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    /// Probed file path.
    pub path: PathBuf,
    /// Container format name (first of ffprobe's comma list).
    pub format: String,
    /// Total duration in seconds.
    pub duration_secs: f64,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Audio codec name, if an audio stream is present.
    pub audio_codec: Option<String>,
    /// Video codec name, if a video stream is present.
    pub video_codec: Option<String>,
}

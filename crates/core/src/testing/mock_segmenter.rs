//! Mock segmenter for testing.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::ledger::SegmentDescriptor;
use crate::segmenter::{MediaInfo, Segmenter, SegmenterError};

/// A recorded segmentation call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSegmentation {
    /// Input that was segmented.
    pub input: PathBuf,
    /// Workspace the segments were written into.
    pub out_dir: PathBuf,
    /// Resume index the caller passed.
    pub resume_from: u32,
}

/// Scripted failure outcomes for the mock segmenter.
#[derive(Debug, Clone)]
pub enum MockSegmentFailure {
    /// Toolkit failure.
    Transcode(String),
    /// Input format outside the supported set.
    Unsupported(String),
}

impl MockSegmentFailure {
    fn into_error(self) -> SegmenterError {
        match self {
            MockSegmentFailure::Transcode(reason) => SegmenterError::TranscodeFailed {
                reason,
                stderr: None,
            },
            MockSegmentFailure::Unsupported(format) => {
                SegmenterError::UnsupportedFormat { format }
            }
        }
    }
}

/// Mock implementation of the Segmenter trait.
///
/// Emits a configurable number of real files into the workspace so tests can
/// assert on-disk reclamation, and mirrors the real worker's empty-input
/// check so upload scenarios behave without scripting.
pub struct MockSegmenter {
    /// Recorded segmentation calls.
    segmentations: Arc<RwLock<Vec<RecordedSegmentation>>>,
    /// Total segments the "input" splits into.
    total_segments: Arc<RwLock<u32>>,
    /// Duration reported for each emitted segment.
    segment_duration_secs: Arc<RwLock<f64>>,
    /// If set, every segmentation fails with this outcome.
    fail_with: Arc<RwLock<Option<MockSegmentFailure>>>,
    /// Simulated segmentation duration.
    delay: Arc<RwLock<Duration>>,
}

impl Default for MockSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSegmenter {
    /// Create a new mock segmenter emitting 3 segments of 60 seconds.
    pub fn new() -> Self {
        Self {
            segmentations: Arc::new(RwLock::new(Vec::new())),
            total_segments: Arc::new(RwLock::new(3)),
            segment_duration_secs: Arc::new(RwLock::new(60.0)),
            fail_with: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(Duration::from_millis(0))),
        }
    }

    /// Get all recorded segmentation calls.
    pub async fn recorded_segmentations(&self) -> Vec<RecordedSegmentation> {
        self.segmentations.read().await.clone()
    }

    /// Set how many segments the input splits into.
    pub async fn set_total_segments(&self, total: u32) {
        *self.total_segments.write().await = total;
    }

    /// Set the duration reported per segment.
    pub async fn set_segment_duration(&self, secs: f64) {
        *self.segment_duration_secs.write().await = secs;
    }

    /// Make every subsequent segmentation fail with the given outcome.
    pub async fn set_failure(&self, failure: MockSegmentFailure) {
        *self.fail_with.write().await = Some(failure);
    }

    /// Set the simulated segmentation duration.
    pub async fn set_segment_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }
}

#[async_trait]
impl Segmenter for MockSegmenter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, SegmenterError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| SegmenterError::InputNotFound {
                path: path.to_path_buf(),
            })?;

        let total = *self.total_segments.read().await;
        let per_segment = *self.segment_duration_secs.read().await;

        Ok(MediaInfo {
            path: path.to_path_buf(),
            format: "mp3".to_string(),
            duration_secs: total as f64 * per_segment,
            size_bytes: meta.len(),
            audio_codec: Some("mp3".to_string()),
            video_codec: None,
        })
    }

    async fn segment(
        &self,
        input: &Path,
        out_dir: &Path,
        resume_from: u32,
    ) -> Result<Vec<SegmentDescriptor>, SegmenterError> {
        self.segmentations.write().await.push(RecordedSegmentation {
            input: input.to_path_buf(),
            out_dir: out_dir.to_path_buf(),
            resume_from,
        });

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = self.fail_with.read().await.clone() {
            return Err(failure.into_error());
        }

        let meta = tokio::fs::metadata(input)
            .await
            .map_err(|_| SegmenterError::InputNotFound {
                path: input.to_path_buf(),
            })?;
        if meta.len() == 0 {
            return Err(SegmenterError::TranscodeFailed {
                reason: format!("input file is empty: {}", input.display()),
                stderr: None,
            });
        }

        let total = *self.total_segments.read().await;
        let per_segment = *self.segment_duration_secs.read().await;

        let mut descriptors = Vec::new();
        for seq in resume_from..total {
            let contents = format!("segment {seq}");
            let path = out_dir.join(format!("part-{seq:05}.mp3"));
            tokio::fs::write(&path, contents.as_bytes()).await?;

            descriptors.push(SegmentDescriptor {
                seq,
                path,
                duration_secs: per_segment,
                size_bytes: contents.len() as u64,
                checksum: format!("{:x}", Sha256::digest(contents.as_bytes())),
            });
        }

        Ok(descriptors)
    }
}

//! Segmenter trait.

use async_trait::async_trait;
use std::path::Path;

use crate::ledger::SegmentDescriptor;

use super::error::SegmenterError;
use super::types::MediaInfo;

/// Splits acquired media into sequentially numbered segments.
///
/// Segmentation is restartable: `segment` takes the index of the next
/// uncommitted segment and re-scans the workspace for prior output instead of
/// re-emitting what the ledger already confirmed.
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Returns the segmenter implementation name.
    fn name(&self) -> &str;

    /// Probe a media file for container, codecs and duration.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, SegmenterError>;

    /// Segment `input` into `out_dir`, starting at index `resume_from`.
    ///
    /// Returns descriptors for the newly emitted segments only, in ascending
    /// sequence order beginning at `resume_from`.
    async fn segment(
        &self,
        input: &Path,
        out_dir: &Path,
        resume_from: u32,
    ) -> Result<Vec<SegmentDescriptor>, SegmenterError>;
}

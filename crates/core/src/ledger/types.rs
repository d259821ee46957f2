//! Core job data types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a job's source media reaches the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Source file was placed in the uploads area by the boundary layer.
    Upload,
    /// Source must be fetched from a remote URL by the downloader.
    RemoteFetch,
}

impl JobKind {
    /// Returns the kind as a string (for storage and filtering).
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Upload => "upload",
            JobKind::RemoteFetch => "remote_fetch",
        }
    }

    /// Parses a stored kind string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(JobKind::Upload),
            "remote_fetch" => Some(JobKind::RemoteFetch),
            _ => None,
        }
    }
}

/// Current state of a job.
///
/// State machine flow:
/// ```text
/// pending -> acquiring -> segmenting -> completed      (remote_fetch)
/// pending -> segmenting -> completed                   (upload)
///
/// failed is reachable from any non-terminal state.
/// cancelled is reachable from pending/acquiring/segmenting.
/// completed, failed and cancelled are terminal.
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job created, waiting to be claimed by a worker.
    Pending,
    /// Downloader is fetching the remote source.
    Acquiring,
    /// Media toolkit is splitting the input into segments.
    Segmenting,
    /// Full manifest produced (terminal).
    Completed,
    /// A stage failed; error detail is persisted on the job (terminal).
    Failed,
    /// Cancelled on external request (terminal).
    Cancelled,
}

impl JobState {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Returns true if the job can be cancelled from this state.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if a worker currently owns this job.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Acquiring | JobState::Segmenting)
    }

    /// Whether `self -> to` is a legal edge of the state machine.
    ///
    /// States only move forward; the only edges out of order are into
    /// `failed` (from any non-terminal state) and `cancelled`.
    pub fn can_transition_to(&self, to: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            JobState::Pending => false,
            JobState::Acquiring => matches!(self, JobState::Pending),
            JobState::Segmenting => matches!(self, JobState::Pending | JobState::Acquiring),
            JobState::Completed => matches!(self, JobState::Segmenting),
            JobState::Failed | JobState::Cancelled => true,
        }
    }

    /// Returns the state as a string (for storage and filtering).
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Acquiring => "acquiring",
            JobState::Segmenting => "segmenting",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Parses a stored state string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "acquiring" => Some(JobState::Acquiring),
            "segmenting" => Some(JobState::Segmenting),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            "cancelled" => Some(JobState::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a job's output manifest. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentDescriptor {
    /// Zero-based sequence index, contiguous within a job.
    pub seq: u32,
    /// Path of the segment file under the segments workspace.
    pub path: PathBuf,
    /// Playback duration in seconds.
    pub duration_secs: f64,
    /// File size in bytes.
    pub size_bytes: u64,
    /// SHA-256 of the file contents, lowercase hex.
    pub checksum: String,
}

/// A job representing one end-to-end acquisition + segmentation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Unique identifier (UUID).
    pub id: String,

    /// How the source reaches the pipeline.
    pub kind: JobKind,

    /// Current state.
    pub state: JobState,

    /// Source reference: a local path for uploads, a URL for remote fetches.
    pub source: String,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,

    /// Error detail, set when the job failed or was cancelled with a reason.
    pub error: Option<String>,

    /// Ordered output manifest. Empty until segmentation commits entries.
    pub manifest: Vec<SegmentDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_is_not_terminal() {
        assert!(!JobState::Pending.is_terminal());
        assert!(JobState::Pending.can_cancel());
        assert!(!JobState::Pending.is_active());
    }

    #[test]
    fn test_terminal_states() {
        for state in [JobState::Completed, JobState::Failed, JobState::Cancelled] {
            assert!(state.is_terminal());
            assert!(!state.can_cancel());
            assert!(!state.is_active());
        }
    }

    #[test]
    fn test_forward_edges() {
        assert!(JobState::Pending.can_transition_to(JobState::Acquiring));
        assert!(JobState::Pending.can_transition_to(JobState::Segmenting));
        assert!(JobState::Acquiring.can_transition_to(JobState::Segmenting));
        assert!(JobState::Segmenting.can_transition_to(JobState::Completed));
    }

    #[test]
    fn test_no_regression() {
        assert!(!JobState::Segmenting.can_transition_to(JobState::Pending));
        assert!(!JobState::Segmenting.can_transition_to(JobState::Acquiring));
        assert!(!JobState::Acquiring.can_transition_to(JobState::Pending));
        assert!(!JobState::Acquiring.can_transition_to(JobState::Completed));
    }

    #[test]
    fn test_failed_reachable_from_any_non_terminal() {
        for state in [JobState::Pending, JobState::Acquiring, JobState::Segmenting] {
            assert!(state.can_transition_to(JobState::Failed));
            assert!(state.can_transition_to(JobState::Cancelled));
        }
    }

    #[test]
    fn test_no_edges_out_of_terminal() {
        for from in [JobState::Completed, JobState::Failed, JobState::Cancelled] {
            for to in [
                JobState::Pending,
                JobState::Acquiring,
                JobState::Segmenting,
                JobState::Completed,
                JobState::Failed,
                JobState::Cancelled,
            ] {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            JobState::Pending,
            JobState::Acquiring,
            JobState::Segmenting,
            JobState::Completed,
            JobState::Failed,
            JobState::Cancelled,
        ] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
        assert_eq!(JobState::parse("bogus"), None);
    }

    #[test]
    fn test_kind_round_trip() {
        assert_eq!(JobKind::parse("upload"), Some(JobKind::Upload));
        assert_eq!(JobKind::parse("remote_fetch"), Some(JobKind::RemoteFetch));
        assert_eq!(JobKind::parse("torrent"), None);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&JobState::Segmenting).unwrap();
        assert_eq!(json, r#""segmenting""#);
        let parsed: JobState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, JobState::Segmenting);
    }

    #[test]
    fn test_descriptor_serialization() {
        let desc = SegmentDescriptor {
            seq: 3,
            path: PathBuf::from("/data/segments/job-1/part-00003.mp3"),
            duration_secs: 60.0,
            size_bytes: 480_000,
            checksum: "ab".repeat(32),
        };
        let json = serde_json::to_string(&desc).unwrap();
        let parsed: SegmentDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, desc);
    }
}

//! Ledger trait and operation types.

use thiserror::Error;

use super::types::{Job, JobKind, JobState, SegmentDescriptor};

/// Error type for ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A job with the same idempotency key already exists.
    #[error("duplicate job for idempotency key: {0}")]
    DuplicateJob(String),

    /// Job not found.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Compare-and-swap precondition failed: the persisted state does not
    /// match the expected `from` state. The record is left untouched.
    #[error("stale state for job {job_id}: expected {expected}, found {actual}")]
    StaleState {
        job_id: String,
        expected: JobState,
        actual: JobState,
    },

    /// The requested edge is not part of the state machine (states only
    /// move forward).
    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobState,
        to: JobState,
    },

    /// Segment append would break manifest contiguity.
    #[error("sequence gap for job {job_id}: expected seq {expected}, got {got}")]
    SequenceGap {
        job_id: String,
        expected: u32,
        got: u32,
    },

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

/// Request to create a new job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    /// How the source reaches the pipeline.
    pub kind: JobKind,
    /// Local path (upload) or URL (remote fetch).
    pub source: String,
    /// Optional client-supplied key for request deduplication.
    pub idempotency_key: Option<String>,
}

/// Filter for querying jobs.
#[derive(Debug, Clone)]
pub struct JobFilter {
    /// Filter by state.
    pub state: Option<JobState>,
    /// Filter by kind.
    pub kind: Option<JobKind>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl JobFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            state: None,
            kind: None,
            limit: 100,
            offset: 0,
        }
    }

    /// Filter by state.
    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    /// Filter by kind.
    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Durable, authoritative store of job state and manifests.
///
/// The ledger is the single source of truth: workers never persist state on
/// their own, and `transition` is the only concurrency-control primitive
/// shared between them.
pub trait JobLedger: Send + Sync {
    /// Insert a new job in state `pending`.
    fn create(&self, request: CreateJobRequest) -> Result<Job, LedgerError>;

    /// Get a job snapshot (manifest included) by ID.
    fn get(&self, id: &str) -> Result<Option<Job>, LedgerError>;

    /// List jobs matching the filter, oldest first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, LedgerError>;

    /// Count jobs matching the filter.
    fn count(&self, filter: &JobFilter) -> Result<i64, LedgerError>;

    /// Compare-and-swap state update.
    ///
    /// Commits `from -> to` only if the persisted state still equals `from`,
    /// failing with [`LedgerError::StaleState`] otherwise. `detail` is
    /// persisted as the job's error field for `failed`/`cancelled` targets
    /// and cleared for all others.
    fn transition(
        &self,
        id: &str,
        from: JobState,
        to: JobState,
        detail: Option<&str>,
    ) -> Result<Job, LedgerError>;

    /// Append one descriptor to the manifest, enforcing contiguity.
    fn append_segment(&self, id: &str, descriptor: &SegmentDescriptor) -> Result<(), LedgerError>;
}

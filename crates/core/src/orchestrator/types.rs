//! Types for the job orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::JobKind;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// The job's current state does not allow the requested operation.
    #[error("cannot {operation} job {job_id}: current state is {state}")]
    InvalidState {
        job_id: String,
        state: String,
        operation: String,
    },

    /// Ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),

    /// Workspace error.
    #[error("workspace error: {0}")]
    Workspace(#[from] crate::workspace::WorkspaceError),
}

/// Request to submit a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    /// How the source reaches the pipeline.
    pub kind: JobKind,
    /// Local path (upload) or URL (remote fetch).
    pub source: String,
    /// Optional client-supplied key for request deduplication.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the orchestrator is running.
    pub running: bool,
    /// Jobs currently held by a worker.
    pub active_jobs: usize,
    /// Jobs waiting for a worker slot.
    pub pending_count: usize,
    /// Jobs in the acquisition stage.
    pub acquiring_count: usize,
    /// Jobs in the segmentation stage.
    pub segmenting_count: usize,
}

//! Boundary-facing job operations.

use crate::fetcher::Fetcher;
use crate::ledger::Job;
use crate::segmenter::Segmenter;

use super::runner::JobOrchestrator;
use super::types::{OrchestratorError, SubmitJobRequest};

/// The three operations the orchestrator exposes to the HTTP boundary:
/// submit, status and cancel.
pub trait JobService: Send + Sync {
    /// Submit a new job.
    fn submit_job(&self, request: SubmitJobRequest) -> Result<Job, OrchestratorError>;

    /// Current snapshot of a job, manifest included.
    fn job_status(&self, id: &str) -> Result<Job, OrchestratorError>;

    /// Cancel a job.
    fn cancel_job(&self, id: &str, reason: Option<&str>) -> Result<Job, OrchestratorError>;
}

impl<F, S> JobService for JobOrchestrator<F, S>
where
    F: Fetcher + 'static,
    S: Segmenter + 'static,
{
    fn submit_job(&self, request: SubmitJobRequest) -> Result<Job, OrchestratorError> {
        self.submit(request)
    }

    fn job_status(&self, id: &str) -> Result<Job, OrchestratorError> {
        self.status(id)
    }

    fn cancel_job(&self, id: &str, reason: Option<&str>) -> Result<Job, OrchestratorError> {
        self.cancel(id, reason)
    }
}

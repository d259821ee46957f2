//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use slicer_core::{
    Job, JobFilter, JobKind, JobState, LedgerError, OrchestratorError, SegmentDescriptor,
    SubmitJobRequest,
};

use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a job
#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    /// How the source reaches the pipeline
    pub kind: JobKind,
    /// Local path (upload) or URL (remote fetch)
    pub source: String,
    /// Optional client-supplied key for request deduplication
    pub idempotency_key: Option<String>,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by state
    pub state: Option<String>,
    /// Filter by kind
    pub kind: Option<String>,
    /// Maximum number of jobs to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Request body for cancelling a job
#[derive(Debug, Deserialize)]
pub struct CancelJobBody {
    /// Optional reason for cancellation
    pub reason: Option<String>,
}

/// One manifest entry in a job response
#[derive(Debug, Serialize)]
pub struct SegmentResponse {
    pub seq: u32,
    pub path: String,
    pub duration_secs: f64,
    pub size_bytes: u64,
    pub checksum: String,
}

impl From<SegmentDescriptor> for SegmentResponse {
    fn from(descriptor: SegmentDescriptor) -> Self {
        Self {
            seq: descriptor.seq,
            path: descriptor.path.to_string_lossy().to_string(),
            duration_secs: descriptor.duration_secs,
            size_bytes: descriptor.size_bytes,
            checksum: descriptor.checksum,
        }
    }
}

/// Response for job operations
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub kind: JobKind,
    pub state: JobState,
    pub source: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub manifest: Vec<SegmentResponse>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            state: job.state,
            source: job.source,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
            error: job.error,
            manifest: job.manifest.into_iter().map(SegmentResponse::from).collect(),
        }
    }
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<JobErrorResponse>) {
    (
        status,
        Json(JobErrorResponse {
            error: error.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a new job
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<JobResponse>), impl IntoResponse> {
    let request = SubmitJobRequest {
        kind: body.kind,
        source: body.source,
        idempotency_key: body.idempotency_key,
    };

    match state.jobs().submit_job(request) {
        Ok(job) => Ok((StatusCode::CREATED, Json(JobResponse::from(job)))),
        Err(OrchestratorError::Ledger(LedgerError::DuplicateJob(key))) => Err(error_response(
            StatusCode::CONFLICT,
            format!("a job with idempotency key {key} already exists"),
        )),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// Get a job by ID (status + manifest)
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, impl IntoResponse> {
    match state.jobs().job_status(&id) {
        Ok(job) => Ok(Json(JobResponse::from(job))),
        Err(OrchestratorError::JobNotFound(_)) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("job not found: {id}"),
        )),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// List jobs with optional filters
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = JobFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref state_param) = params.state {
        match JobState::parse(state_param) {
            Some(job_state) => filter = filter.with_state(job_state),
            None => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("unknown state filter: {state_param}"),
                ));
            }
        }
    }

    if let Some(ref kind_param) = params.kind {
        match JobKind::parse(kind_param) {
            Some(kind) => filter = filter.with_kind(kind),
            None => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("unknown kind filter: {kind_param}"),
                ));
            }
        }
    }

    let jobs = match state.ledger().list(&filter) {
        Ok(jobs) => jobs,
        Err(e) => return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    let total = match state.ledger().count(&filter) {
        Ok(count) => count,
        Err(e) => return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    Ok(Json(ListJobsResponse {
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Cancel a job (DELETE endpoint)
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<CancelJobBody>>,
) -> Result<Json<JobResponse>, impl IntoResponse> {
    let reason = body.and_then(|b| b.reason.clone());

    match state.jobs().cancel_job(&id, reason.as_deref()) {
        Ok(job) => Ok(Json(JobResponse::from(job))),
        Err(OrchestratorError::JobNotFound(_)) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("job not found: {id}"),
        )),
        Err(OrchestratorError::InvalidState { state, .. }) => Err(error_response(
            StatusCode::CONFLICT,
            format!("cannot cancel job: current state is {state}"),
        )),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

//! Job orchestrator implementation.
//!
//! Drives jobs through the state machine: claims pending jobs by
//! compare-and-swap, runs acquisition and segmentation through a bounded
//! worker pool, and commits every stage transition to the ledger before the
//! next stage starts, so a restart resumes each job from its committed state.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use crate::fetcher::Fetcher;
use crate::ledger::{
    CreateJobRequest, Job, JobFilter, JobKind, JobLedger, JobState, LedgerError,
};
use crate::metrics;
use crate::segmenter::Segmenter;
use crate::workspace::{WorkspaceKind, WorkspaceManager};

use super::config::OrchestratorConfig;
use super::types::{OrchestratorError, OrchestratorStatus, SubmitJobRequest};

/// The job orchestrator - sequences acquisition and segmentation per job.
pub struct JobOrchestrator<F, S>
where
    F: Fetcher + 'static,
    S: Segmenter + 'static,
{
    config: OrchestratorConfig,
    ledger: Arc<dyn JobLedger>,
    workspaces: Arc<WorkspaceManager>,
    fetcher: Arc<F>,
    segmenter: Arc<S>,

    // Runtime state
    running: Arc<AtomicBool>,
    worker_slots: Arc<Semaphore>,
    active_jobs: Arc<RwLock<HashSet<String>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<F, S> JobOrchestrator<F, S>
where
    F: Fetcher + 'static,
    S: Segmenter + 'static,
{
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        ledger: Arc<dyn JobLedger>,
        workspaces: Arc<WorkspaceManager>,
        fetcher: Arc<F>,
        segmenter: Arc<S>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let worker_slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));

        Self {
            config,
            ledger,
            workspaces,
            fetcher,
            segmenter,
            running: Arc::new(AtomicBool::new(false)),
            worker_slots,
            active_jobs: Arc::new(RwLock::new(HashSet::new())),
            shutdown_tx,
        }
    }

    /// Submit a new job. The dispatch loop will pick it up.
    pub fn submit(&self, request: SubmitJobRequest) -> Result<Job, OrchestratorError> {
        let job = self.ledger.create(CreateJobRequest {
            kind: request.kind,
            source: request.source,
            idempotency_key: request.idempotency_key,
        })?;
        metrics::JOBS_SUBMITTED.inc();
        info!(job_id = %job.id, kind = job.kind.as_str(), "job submitted");
        Ok(job)
    }

    /// Current snapshot of a job, manifest included.
    pub fn status(&self, id: &str) -> Result<Job, OrchestratorError> {
        self.ledger
            .get(id)?
            .ok_or_else(|| OrchestratorError::JobNotFound(id.to_string()))
    }

    /// Cancel a job.
    ///
    /// The cancellation is committed directly to the ledger; an in-flight
    /// worker observes it as `StaleState` at its next transition boundary and
    /// reclaims the workspace. Pending jobs are reclaimed inline.
    pub fn cancel(&self, id: &str, reason: Option<&str>) -> Result<Job, OrchestratorError> {
        loop {
            let job = self
                .ledger
                .get(id)?
                .ok_or_else(|| OrchestratorError::JobNotFound(id.to_string()))?;

            if job.state.is_terminal() {
                return Err(OrchestratorError::InvalidState {
                    job_id: id.to_string(),
                    state: job.state.to_string(),
                    operation: "cancel".to_string(),
                });
            }

            let was_idle = job.state == JobState::Pending;
            let detail = reason.unwrap_or("cancelled by request");

            match self
                .ledger
                .transition(id, job.state, JobState::Cancelled, Some(detail))
            {
                Ok(cancelled) => {
                    metrics::JOBS_CANCELLED.inc();
                    info!(job_id = id, from = %job.state, "job cancelled");
                    if was_idle {
                        if let Err(e) = self.workspaces.release(id) {
                            warn!(job_id = id, error = %e, "failed to reclaim workspace");
                        }
                    }
                    return Ok(cancelled);
                }
                // State moved underneath us; re-read and try again.
                Err(LedgerError::StaleState { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Start the orchestrator (spawns the dispatch loop).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("orchestrator already running");
            return;
        }

        info!(
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "starting job orchestrator"
        );
        self.spawn_dispatch_loop();
    }

    /// Stop the orchestrator gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("orchestrator not running");
            return;
        }

        info!("stopping job orchestrator");
        let _ = self.shutdown_tx.send(());

        // Give workers a moment to reach their next checkpoint
        tokio::time::sleep(Duration::from_millis(500)).await;

        info!("job orchestrator stopped");
    }

    /// Get current orchestrator status.
    pub async fn orchestrator_status(&self) -> OrchestratorStatus {
        let active_jobs = self.active_jobs.read().await.len();

        let count_state = |state| {
            self.ledger
                .count(&JobFilter::new().with_state(state))
                .unwrap_or(0) as usize
        };

        OrchestratorStatus {
            running: self.running.load(Ordering::Relaxed),
            active_jobs,
            pending_count: count_state(JobState::Pending),
            acquiring_count: count_state(JobState::Acquiring),
            segmenting_count: count_state(JobState::Segmenting),
        }
    }

    /// Spawn the dispatch loop task.
    fn spawn_dispatch_loop(&self) {
        let running = Arc::clone(&self.running);
        let ledger = Arc::clone(&self.ledger);
        let workspaces = Arc::clone(&self.workspaces);
        let fetcher = Arc::clone(&self.fetcher);
        let segmenter = Arc::clone(&self.segmenter);
        let worker_slots = Arc::clone(&self.worker_slots);
        let active_jobs = Arc::clone(&self.active_jobs);
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("dispatch loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("dispatch loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = Self::dispatch_tick(
                            &config,
                            &ledger,
                            &workspaces,
                            &fetcher,
                            &segmenter,
                            &worker_slots,
                            &active_jobs,
                        ).await {
                            warn!(error = %e, "dispatch error");
                        }
                    }
                }
            }
            info!("dispatch loop stopped");
        });
    }

    /// One dispatch round: claim pending jobs, re-dispatch in-flight jobs
    /// left over from a restart, and sweep expired workspaces.
    async fn dispatch_tick(
        config: &OrchestratorConfig,
        ledger: &Arc<dyn JobLedger>,
        workspaces: &Arc<WorkspaceManager>,
        fetcher: &Arc<F>,
        segmenter: &Arc<S>,
        worker_slots: &Arc<Semaphore>,
        active_jobs: &Arc<RwLock<HashSet<String>>>,
    ) -> Result<(), OrchestratorError> {
        // In-flight jobs without a worker are restart leftovers: they already
        // committed acquiring/segmenting and resume at that stage.
        for state in [JobState::Acquiring, JobState::Segmenting] {
            let stranded = ledger.list(
                &JobFilter::new()
                    .with_state(state)
                    .with_limit(config.max_concurrent_jobs as i64),
            )?;
            for job in stranded {
                if active_jobs.read().await.contains(&job.id) {
                    continue;
                }
                let Ok(permit) = Arc::clone(worker_slots).try_acquire_owned() else {
                    break;
                };
                info!(job_id = %job.id, state = %state, "re-dispatching in-flight job");
                active_jobs.write().await.insert(job.id.clone());
                Self::spawn_worker(
                    job.id.clone(),
                    permit,
                    Arc::clone(ledger),
                    Arc::clone(workspaces),
                    Arc::clone(fetcher),
                    Arc::clone(segmenter),
                    Arc::clone(active_jobs),
                );
            }
        }

        // Claim pending jobs up to the worker pool limit; the rest stay
        // queued in pending.
        let pending = ledger.list(
            &JobFilter::new()
                .with_state(JobState::Pending)
                .with_limit(config.max_concurrent_jobs as i64 * 2),
        )?;

        for job in pending {
            if active_jobs.read().await.contains(&job.id) {
                continue;
            }
            let Ok(permit) = Arc::clone(worker_slots).try_acquire_owned() else {
                break;
            };

            // Upload jobs enter at segmenting once the uploaded file is
            // confirmed present.
            if job.kind == JobKind::Upload && !Path::new(&job.source).is_file() {
                drop(permit);
                let detail = format!("uploaded file not found: {}", job.source);
                match ledger.transition(&job.id, JobState::Pending, JobState::Failed, Some(&detail))
                {
                    Ok(_) => {
                        metrics::JOBS_FAILED.with_label_values(&["pending"]).inc();
                        warn!(job_id = %job.id, %detail, "upload job failed pre-dispatch");
                    }
                    Err(LedgerError::StaleState { .. }) => {}
                    Err(e) => warn!(job_id = %job.id, error = %e, "failed to fail upload job"),
                }
                continue;
            }

            let target = match job.kind {
                JobKind::RemoteFetch => JobState::Acquiring,
                JobKind::Upload => JobState::Segmenting,
            };

            match ledger.transition(&job.id, JobState::Pending, target, None) {
                Ok(claimed) => {
                    debug!(job_id = %claimed.id, to = %target, "claimed pending job");
                    active_jobs.write().await.insert(claimed.id.clone());
                    Self::spawn_worker(
                        claimed.id,
                        permit,
                        Arc::clone(ledger),
                        Arc::clone(workspaces),
                        Arc::clone(fetcher),
                        Arc::clone(segmenter),
                        Arc::clone(active_jobs),
                    );
                }
                // Lost the claim (cancelled or another dispatcher); move on.
                Err(LedgerError::StaleState { .. }) => drop(permit),
                Err(e) => {
                    drop(permit);
                    warn!(job_id = %job.id, error = %e, "failed to claim job");
                }
            }
        }

        if let Some(ttl_secs) = config.workspace_ttl_secs {
            Self::sweep_expired_workspaces(ledger, workspaces, ttl_secs)?;
        }

        Ok(())
    }

    /// Reclaim workspaces of terminal jobs older than the TTL.
    fn sweep_expired_workspaces(
        ledger: &Arc<dyn JobLedger>,
        workspaces: &Arc<WorkspaceManager>,
        ttl_secs: u64,
    ) -> Result<(), OrchestratorError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(ttl_secs as i64);
        for state in [JobState::Completed, JobState::Failed, JobState::Cancelled] {
            let jobs = ledger.list(&JobFilter::new().with_state(state).with_limit(100))?;
            for job in jobs {
                if job.updated_at < cutoff {
                    if let Err(e) = workspaces.release(&job.id) {
                        warn!(job_id = %job.id, error = %e, "TTL sweep failed");
                    }
                }
            }
        }
        Ok(())
    }

    /// Spawn a worker task owning one pool permit for the job's lifetime.
    fn spawn_worker(
        job_id: String,
        permit: OwnedSemaphorePermit,
        ledger: Arc<dyn JobLedger>,
        workspaces: Arc<WorkspaceManager>,
        fetcher: Arc<F>,
        segmenter: Arc<S>,
        active_jobs: Arc<RwLock<HashSet<String>>>,
    ) {
        tokio::spawn(async move {
            Self::run_job(&job_id, &ledger, &workspaces, &fetcher, &segmenter).await;
            active_jobs.write().await.remove(&job_id);
            drop(permit);
        });
    }

    /// Run one job from its committed state to a terminal state (or hand-off).
    async fn run_job(
        job_id: &str,
        ledger: &Arc<dyn JobLedger>,
        workspaces: &Arc<WorkspaceManager>,
        fetcher: &Arc<F>,
        segmenter: &Arc<S>,
    ) {
        // Re-read the committed state: the snapshot used for dispatch may be
        // stale by the time the worker starts.
        let mut job = match ledger.get(job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id, "job disappeared before worker start");
                return;
            }
            Err(e) => {
                error!(job_id, error = %e, "failed to load job");
                return;
            }
        };

        if !job.state.is_active() {
            debug!(job_id, state = %job.state, "job no longer active, worker exiting");
            return;
        }

        debug!(job_id, state = %job.state, "worker picked up job");
        let mut input_path: Option<PathBuf> = None;

        // Acquisition stage
        if job.state == JobState::Acquiring {
            let dest = match workspaces.allocate(job_id, WorkspaceKind::Downloads) {
                Ok(dest) => dest,
                Err(e) => {
                    Self::fail_job(
                        ledger,
                        workspaces,
                        job_id,
                        JobState::Acquiring,
                        "acquiring",
                        &e.to_string(),
                    );
                    return;
                }
            };

            match fetcher.fetch(&job.source, &dest).await {
                Ok(media) => {
                    match ledger.transition(job_id, JobState::Acquiring, JobState::Segmenting, None)
                    {
                        Ok(updated) => {
                            job = updated;
                            input_path = Some(media.path);
                        }
                        Err(LedgerError::StaleState { .. }) => {
                            Self::handle_preempted(ledger, workspaces, job_id);
                            return;
                        }
                        Err(e) => {
                            error!(job_id, error = %e, "failed to commit acquiring -> segmenting");
                            return;
                        }
                    }
                }
                Err(e) => {
                    Self::fail_job(
                        ledger,
                        workspaces,
                        job_id,
                        JobState::Acquiring,
                        "acquiring",
                        &e.to_string(),
                    );
                    return;
                }
            }
        }

        // Segmentation stage
        let input = match input_path.or_else(|| match job.kind {
            JobKind::Upload => Some(PathBuf::from(&job.source)),
            JobKind::RemoteFetch => Self::find_downloaded_input(workspaces, job_id),
        }) {
            Some(path) => path,
            None => {
                Self::fail_job(
                    ledger,
                    workspaces,
                    job_id,
                    JobState::Segmenting,
                    "segmenting",
                    "downloaded source missing from workspace",
                );
                return;
            }
        };

        let seg_dir = match workspaces.allocate(job_id, WorkspaceKind::Segments) {
            Ok(dir) => dir,
            Err(e) => {
                Self::fail_job(
                    ledger,
                    workspaces,
                    job_id,
                    JobState::Segmenting,
                    "segmenting",
                    &e.to_string(),
                );
                return;
            }
        };

        // Resume after the last ledger-confirmed segment; the segmenter
        // re-scans the workspace itself.
        let resume_from = job.manifest.len() as u32;

        match segmenter.segment(&input, &seg_dir, resume_from).await {
            Ok(new_segments) => {
                let mut total = resume_from as usize;
                for descriptor in &new_segments {
                    if let Err(e) = ledger.append_segment(job_id, descriptor) {
                        Self::fail_job(
                            ledger,
                            workspaces,
                            job_id,
                            JobState::Segmenting,
                            "segmenting",
                            &e.to_string(),
                        );
                        return;
                    }
                    total += 1;
                }

                if total == 0 {
                    Self::fail_job(
                        ledger,
                        workspaces,
                        job_id,
                        JobState::Segmenting,
                        "segmenting",
                        "no segments produced",
                    );
                    return;
                }

                match ledger.transition(job_id, JobState::Segmenting, JobState::Completed, None) {
                    Ok(_) => {
                        metrics::JOBS_COMPLETED.inc();
                        info!(job_id, segments = total, "job completed");
                        // Keep the segments (they are the output), reclaim
                        // the acquisition staging area.
                        if let Err(e) = workspaces.release_kind(job_id, WorkspaceKind::Downloads) {
                            warn!(job_id, error = %e, "failed to reclaim downloads workspace");
                        }
                    }
                    Err(LedgerError::StaleState { .. }) => {
                        Self::handle_preempted(ledger, workspaces, job_id);
                    }
                    Err(e) => {
                        error!(job_id, error = %e, "failed to commit segmenting -> completed");
                    }
                }
            }
            Err(e) => {
                Self::fail_job(
                    ledger,
                    workspaces,
                    job_id,
                    JobState::Segmenting,
                    "segmenting",
                    &e.to_string(),
                );
            }
        }
    }

    /// Commit a failure with its detail and reclaim the workspace.
    fn fail_job(
        ledger: &Arc<dyn JobLedger>,
        workspaces: &Arc<WorkspaceManager>,
        job_id: &str,
        from: JobState,
        stage: &str,
        detail: &str,
    ) {
        match ledger.transition(job_id, from, JobState::Failed, Some(detail)) {
            Ok(_) => {
                metrics::JOBS_FAILED.with_label_values(&[stage]).inc();
                warn!(job_id, stage, detail, "job failed");
                if let Err(e) = workspaces.release(job_id) {
                    warn!(job_id, error = %e, "failed to reclaim workspace");
                }
            }
            Err(LedgerError::StaleState { .. }) => {
                Self::handle_preempted(ledger, workspaces, job_id);
            }
            Err(e) => {
                error!(job_id, error = %e, "failed to commit failed state");
            }
        }
    }

    /// A transition lost its compare-and-swap: the state moved underneath the
    /// worker. The common case is an external cancellation, whose cleanup
    /// falls to the worker holding the job.
    fn handle_preempted(
        ledger: &Arc<dyn JobLedger>,
        workspaces: &Arc<WorkspaceManager>,
        job_id: &str,
    ) {
        match ledger.get(job_id) {
            Ok(Some(job)) if job.state == JobState::Cancelled => {
                info!(job_id, "job cancelled externally, reclaiming workspace");
                if let Err(e) = workspaces.release(job_id) {
                    warn!(job_id, error = %e, "failed to reclaim workspace");
                }
            }
            Ok(Some(job)) => {
                warn!(job_id, state = %job.state, "job state changed underneath worker");
            }
            Ok(None) => warn!(job_id, "job disappeared underneath worker"),
            Err(e) => error!(job_id, error = %e, "failed to inspect preempted job"),
        }
    }

    /// Locate the file a prior fetch left in the downloads workspace.
    fn find_downloaded_input(workspaces: &WorkspaceManager, job_id: &str) -> Option<PathBuf> {
        let dir = workspaces.path_of(job_id, WorkspaceKind::Downloads);
        let entries = std::fs::read_dir(dir).ok()?;
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.path())
            .collect();
        files.sort();
        files.into_iter().next()
    }
}

//! Job lifecycle integration tests.
//!
//! These tests drive complete jobs through the orchestrator with mock
//! workers: pending -> acquiring -> segmenting -> completed, plus the
//! failure, cancellation and resume paths.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use slicer_core::{
    testing::{MockFetchFailure, MockFetcher, MockSegmenter},
    JobKind, JobLedger, JobOrchestrator, JobState, OrchestratorConfig, SegmentDescriptor,
    SqliteLedger, StorageConfig, SubmitJobRequest, WorkspaceManager,
};

/// Test helper wiring all orchestrator dependencies.
struct TestHarness {
    ledger: Arc<SqliteLedger>,
    workspaces: Arc<WorkspaceManager>,
    fetcher: Arc<MockFetcher>,
    segmenter: Arc<MockSegmenter>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let ledger = Arc::new(SqliteLedger::new(&db_path).expect("failed to create ledger"));
        let workspaces = Arc::new(WorkspaceManager::new(StorageConfig {
            uploads_dir: temp_dir.path().join("uploads"),
            segments_dir: temp_dir.path().join("segments"),
            downloads_dir: temp_dir.path().join("downloads"),
            min_free_bytes: 0,
        }));

        Self {
            ledger,
            workspaces,
            fetcher: Arc::new(MockFetcher::new()),
            segmenter: Arc::new(MockSegmenter::new()),
            temp_dir,
        }
    }

    fn create_orchestrator(&self) -> JobOrchestrator<MockFetcher, MockSegmenter> {
        self.create_orchestrator_with(OrchestratorConfig {
            enabled: true,
            poll_interval_ms: 25,
            max_concurrent_jobs: 3,
            workspace_ttl_secs: None,
        })
    }

    fn create_orchestrator_with(
        &self,
        config: OrchestratorConfig,
    ) -> JobOrchestrator<MockFetcher, MockSegmenter> {
        JobOrchestrator::new(
            config,
            Arc::clone(&self.ledger) as Arc<dyn JobLedger>,
            Arc::clone(&self.workspaces),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.segmenter),
        )
    }

    fn downloads_dir(&self, job_id: &str) -> PathBuf {
        self.temp_dir.path().join("downloads").join(job_id)
    }

    fn segments_dir(&self, job_id: &str) -> PathBuf {
        self.temp_dir.path().join("segments").join(job_id)
    }

    /// Write an upload source file and return its path as a string.
    fn stage_upload(&self, name: &str, contents: &[u8]) -> String {
        let dir = self.temp_dir.path().join("uploads");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path.to_string_lossy().to_string()
    }

    async fn wait_for_state(&self, job_id: &str, expected: JobState, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if let Ok(Some(job)) = self.ledger.get(job_id) {
                if job.state == expected {
                    return true;
                }
                if job.state.is_terminal() && job.state != expected {
                    return false;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    async fn wait_until_absent(&self, path: &PathBuf, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if !path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

fn remote_request(source: &str) -> SubmitJobRequest {
    SubmitJobRequest {
        kind: JobKind::RemoteFetch,
        source: source.to_string(),
        idempotency_key: None,
    }
}

fn upload_request(source: String) -> SubmitJobRequest {
    SubmitJobRequest {
        kind: JobKind::Upload,
        source,
        idempotency_key: None,
    }
}

#[tokio::test]
async fn test_remote_fetch_happy_path() {
    let harness = TestHarness::new();
    harness.segmenter.set_total_segments(3).await;
    harness.segmenter.set_segment_duration(60.0).await;

    let orch = harness.create_orchestrator();
    orch.start().await;

    let job = orch
        .submit(remote_request("https://media.example.com/talk"))
        .unwrap();

    assert!(
        harness
            .wait_for_state(&job.id, JobState::Completed, Duration::from_secs(5))
            .await,
        "job should complete"
    );

    let done = orch.status(&job.id).unwrap();
    assert_eq!(done.manifest.len(), 3);
    for (i, descriptor) in done.manifest.iter().enumerate() {
        assert_eq!(descriptor.seq, i as u32);
        assert!(descriptor.size_bytes > 0);
        assert!(descriptor.duration_secs > 0.0);
        assert!(descriptor.path.exists());
    }

    // Segments survive completion, the acquisition staging area does not.
    assert!(harness.segments_dir(&job.id).exists());
    assert!(!harness.downloads_dir(&job.id).exists());
    assert_eq!(harness.fetcher.fetch_count().await, 1);

    orch.stop().await;
}

#[tokio::test]
async fn test_upload_skips_acquisition() {
    let harness = TestHarness::new();
    harness.segmenter.set_total_segments(2).await;

    let source = harness.stage_upload("meeting.wav", b"uploaded media bytes");
    let orch = harness.create_orchestrator();
    orch.start().await;

    let job = orch.submit(upload_request(source)).unwrap();

    assert!(
        harness
            .wait_for_state(&job.id, JobState::Completed, Duration::from_secs(5))
            .await
    );

    // Upload jobs never touch the fetcher.
    assert_eq!(harness.fetcher.fetch_count().await, 0);
    let done = orch.status(&job.id).unwrap();
    assert_eq!(done.manifest.len(), 2);

    orch.stop().await;
}

#[tokio::test]
async fn test_unreachable_source_fails_with_detail() {
    let harness = TestHarness::new();
    harness
        .fetcher
        .set_failure(MockFetchFailure::RetriesExhausted {
            attempts: 3,
            last_error: "connection timed out".to_string(),
        })
        .await;

    let orch = harness.create_orchestrator();
    orch.start().await;

    let job = orch
        .submit(remote_request("https://unreachable.example.com/v"))
        .unwrap();

    assert!(
        harness
            .wait_for_state(&job.id, JobState::Failed, Duration::from_secs(5))
            .await
    );

    let failed = orch.status(&job.id).unwrap();
    let detail = failed.error.expect("error detail must be persisted");
    assert!(detail.contains("3 attempts"));
    assert!(detail.contains("connection timed out"));

    // Workspace fully reclaimed.
    assert!(
        harness
            .wait_until_absent(&harness.downloads_dir(&job.id), Duration::from_secs(2))
            .await
    );

    orch.stop().await;
}

#[tokio::test]
async fn test_unrecoverable_source_fails_without_retry() {
    let harness = TestHarness::new();
    harness
        .fetcher
        .set_failure(MockFetchFailure::Unrecoverable(
            "Unsupported URL: gopher://old".to_string(),
        ))
        .await;

    let orch = harness.create_orchestrator();
    orch.start().await;

    let job = orch.submit(remote_request("https://example.com/bad")).unwrap();

    assert!(
        harness
            .wait_for_state(&job.id, JobState::Failed, Duration::from_secs(5))
            .await
    );

    let failed = orch.status(&job.id).unwrap();
    assert!(failed.error.unwrap().contains("Unsupported URL"));

    orch.stop().await;
}

#[tokio::test]
async fn test_cancel_during_acquiring_reclaims_workspace() {
    let harness = TestHarness::new();
    harness
        .fetcher
        .set_fetch_delay(Duration::from_millis(500))
        .await;

    let orch = harness.create_orchestrator();
    orch.start().await;

    let job = orch.submit(remote_request("https://example.com/slow")).unwrap();

    assert!(
        harness
            .wait_for_state(&job.id, JobState::Acquiring, Duration::from_secs(5))
            .await,
        "job should reach acquiring"
    );

    let cancelled = orch.cancel(&job.id, Some("no longer needed")).unwrap();
    assert_eq!(cancelled.state, JobState::Cancelled);

    // The in-flight worker observes the cancellation at its next transition
    // boundary and reclaims the workspace.
    assert!(
        harness
            .wait_until_absent(&harness.downloads_dir(&job.id), Duration::from_secs(3))
            .await,
        "workspace should be reclaimed after cancellation"
    );

    let final_job = orch.status(&job.id).unwrap();
    assert_eq!(final_job.state, JobState::Cancelled);
    assert_eq!(final_job.error.as_deref(), Some("no longer needed"));

    orch.stop().await;
}

#[tokio::test]
async fn test_empty_upload_fails_as_transcode() {
    let harness = TestHarness::new();
    let source = harness.stage_upload("empty.wav", b"");

    let orch = harness.create_orchestrator();
    orch.start().await;

    let job = orch.submit(upload_request(source)).unwrap();

    assert!(
        harness
            .wait_for_state(&job.id, JobState::Failed, Duration::from_secs(5))
            .await
    );

    let failed = orch.status(&job.id).unwrap();
    assert!(failed.error.unwrap().contains("empty"));
    assert!(failed.manifest.is_empty());

    orch.stop().await;
}

#[tokio::test]
async fn test_missing_upload_fails_before_dispatch() {
    let harness = TestHarness::new();
    let orch = harness.create_orchestrator();
    orch.start().await;

    let job = orch
        .submit(upload_request(
            harness
                .temp_dir
                .path()
                .join("uploads/never-written.wav")
                .to_string_lossy()
                .to_string(),
        ))
        .unwrap();

    assert!(
        harness
            .wait_for_state(&job.id, JobState::Failed, Duration::from_secs(5))
            .await
    );

    let failed = orch.status(&job.id).unwrap();
    assert!(failed.error.unwrap().contains("not found"));

    orch.stop().await;
}

#[tokio::test]
async fn test_segmentation_resumes_from_committed_index() {
    let harness = TestHarness::new();
    harness.segmenter.set_total_segments(4).await;

    // Simulate a job interrupted mid-segmentation: state committed as
    // segmenting with two manifest entries, then the process died.
    let source = harness.stage_upload("long.wav", b"uploaded media bytes");
    let job = harness
        .ledger
        .create(slicer_core::CreateJobRequest {
            kind: JobKind::Upload,
            source,
            idempotency_key: None,
        })
        .unwrap();
    harness
        .ledger
        .transition(&job.id, JobState::Pending, JobState::Segmenting, None)
        .unwrap();

    let seg_dir = harness.segments_dir(&job.id);
    std::fs::create_dir_all(&seg_dir).unwrap();
    for seq in 0..2u32 {
        let path = seg_dir.join(format!("part-{seq:05}.mp3"));
        std::fs::write(&path, format!("segment {seq}")).unwrap();
        harness
            .ledger
            .append_segment(
                &job.id,
                &SegmentDescriptor {
                    seq,
                    path,
                    duration_secs: 60.0,
                    size_bytes: 9,
                    checksum: format!("{seq:064x}"),
                },
            )
            .unwrap();
    }

    let orch = harness.create_orchestrator();
    orch.start().await;

    assert!(
        harness
            .wait_for_state(&job.id, JobState::Completed, Duration::from_secs(5))
            .await,
        "restarted job should complete"
    );

    // The worker resumed after the last confirmed index instead of
    // re-emitting segments 0 and 1.
    let calls = harness.segmenter.recorded_segmentations().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].resume_from, 2);

    let done = harness.ledger.get(&job.id).unwrap().unwrap();
    let seqs: Vec<u32> = done.manifest.iter().map(|d| d.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);

    orch.stop().await;
}

#[tokio::test]
async fn test_admission_control_queues_beyond_limit() {
    let harness = TestHarness::new();
    harness
        .fetcher
        .set_fetch_delay(Duration::from_millis(400))
        .await;

    let orch = harness.create_orchestrator_with(OrchestratorConfig {
        enabled: true,
        poll_interval_ms: 25,
        max_concurrent_jobs: 1,
        workspace_ttl_secs: None,
    });
    orch.start().await;

    let first = orch.submit(remote_request("https://example.com/a")).unwrap();
    let second = orch.submit(remote_request("https://example.com/b")).unwrap();

    assert!(
        harness
            .wait_for_state(&first.id, JobState::Acquiring, Duration::from_secs(5))
            .await
    );

    // With a single worker slot the second job must still be queued.
    let queued = harness.ledger.get(&second.id).unwrap().unwrap();
    assert_eq!(queued.state, JobState::Pending);

    // Both finish eventually.
    assert!(
        harness
            .wait_for_state(&first.id, JobState::Completed, Duration::from_secs(10))
            .await
    );
    assert!(
        harness
            .wait_for_state(&second.id, JobState::Completed, Duration::from_secs(10))
            .await
    );

    orch.stop().await;
}

#[tokio::test]
async fn test_manifest_contiguity_across_lifecycle() {
    let harness = TestHarness::new();
    harness.segmenter.set_total_segments(5).await;

    let orch = harness.create_orchestrator();
    orch.start().await;

    let job = orch
        .submit(remote_request("https://media.example.com/long-talk"))
        .unwrap();

    assert!(
        harness
            .wait_for_state(&job.id, JobState::Completed, Duration::from_secs(5))
            .await
    );

    let done = orch.status(&job.id).unwrap();
    let seqs: Vec<u32> = done.manifest.iter().map(|d| d.seq).collect();
    assert_eq!(seqs, (0..5).collect::<Vec<u32>>());

    orch.stop().await;
}

//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (job lifecycle outcomes)
//! - Acquisition worker (attempts, durations)
//! - Segmentation worker (segments, durations)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Job lifecycle
// =============================================================================

/// Jobs submitted total.
pub static JOBS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("slicer_jobs_submitted_total", "Total jobs submitted").unwrap()
});

/// Jobs completed total.
pub static JOBS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "slicer_jobs_completed_total",
        "Total jobs completed successfully",
    )
    .unwrap()
});

/// Jobs failed total by stage.
pub static JOBS_FAILED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("slicer_jobs_failed_total", "Total jobs failed"),
        &["stage"], // "acquiring", "segmenting"
    )
    .unwrap()
});

/// Jobs cancelled total.
pub static JOBS_CANCELLED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("slicer_jobs_cancelled_total", "Total jobs cancelled").unwrap()
});

// =============================================================================
// Acquisition worker
// =============================================================================

/// Fetch attempts total by result.
pub static FETCH_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("slicer_fetch_attempts_total", "Total fetch attempts"),
        &["result"], // "success", "transient", "unrecoverable"
    )
    .unwrap()
});

/// Fetch duration in seconds, retries included.
pub static FETCH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("slicer_fetch_duration_seconds", "Duration of fetches").buckets(vec![
            1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0,
        ]),
    )
    .unwrap()
});

// =============================================================================
// Segmentation worker
// =============================================================================

/// Segments emitted total.
pub static SEGMENTS_EMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("slicer_segments_emitted_total", "Total segments emitted").unwrap()
});

/// Segmentation duration in seconds.
pub static SEGMENTATION_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "slicer_segmentation_duration_seconds",
            "Duration of segmentation runs",
        )
        .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(JOBS_COMPLETED.clone()),
        Box::new(JOBS_FAILED.clone()),
        Box::new(JOBS_CANCELLED.clone()),
        Box::new(FETCH_ATTEMPTS.clone()),
        Box::new(FETCH_DURATION.clone()),
        Box::new(SEGMENTS_EMITTED.clone()),
        Box::new(SEGMENTATION_DURATION.clone()),
    ]
}

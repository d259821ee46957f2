//! Core of the media acquisition and segmentation pipeline.
//!
//! Jobs move `pending -> acquiring -> segmenting -> completed` (uploads skip
//! acquisition), with `failed` and `cancelled` as the other terminal states.
//! The [`ledger`] is the single durable source of truth; the
//! [`orchestrator`] sequences the external workers and commits every
//! transition by compare-and-swap before the next stage runs.

pub mod config;
pub mod fetcher;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod segmenter;
pub mod testing;
pub mod workspace;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    ServerConfig,
};
pub use fetcher::{FetchError, FetchedMedia, Fetcher, FetcherConfig, YtDlpFetcher};
pub use ledger::{
    CreateJobRequest, Job, JobFilter, JobKind, JobLedger, JobState, LedgerError, SegmentDescriptor,
    SqliteLedger,
};
pub use orchestrator::{
    JobOrchestrator, JobService, OrchestratorConfig, OrchestratorError, OrchestratorStatus,
    SubmitJobRequest,
};
pub use segmenter::{
    FfmpegSegmenter, MediaInfo, Segmenter, SegmenterConfig, SegmenterError, SilenceConfig,
};
pub use workspace::{StorageConfig, WorkspaceError, WorkspaceKind, WorkspaceManager};

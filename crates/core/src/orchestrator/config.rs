//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the job orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Enable/disable the orchestrator.
    /// When disabled, submitted jobs stay pending.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How often to poll for pending jobs (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Size of the worker pool. Jobs beyond the limit queue in `pending`
    /// rather than being rejected.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Reclaim terminal jobs' workspaces after this many seconds.
    /// None keeps them until explicit cleanup.
    #[serde(default)]
    pub workspace_ttl_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    1000 // 1 second
}

fn default_max_concurrent_jobs() -> usize {
    4
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            poll_interval_ms: default_poll_interval(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            workspace_ttl_secs: None,
        }
    }
}

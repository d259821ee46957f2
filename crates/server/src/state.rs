use std::sync::Arc;

use prometheus::Registry;
use slicer_core::{Config, JobLedger, JobService};

/// Shared application state
pub struct AppState {
    config: Config,
    ledger: Arc<dyn JobLedger>,
    jobs: Arc<dyn JobService>,
    metrics_registry: Registry,
}

impl AppState {
    pub fn new(config: Config, ledger: Arc<dyn JobLedger>, jobs: Arc<dyn JobService>) -> Self {
        let metrics_registry = Registry::new();
        for collector in slicer_core::metrics::all_metrics() {
            // Double registration only happens when several states share a
            // process (tests); the metrics themselves are process-global.
            let _ = metrics_registry.register(collector);
        }

        Self {
            config,
            ledger,
            jobs,
            metrics_registry,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &dyn JobLedger {
        self.ledger.as_ref()
    }

    pub fn jobs(&self) -> &dyn JobService {
        self.jobs.as_ref()
    }

    pub fn metrics_registry(&self) -> &Registry {
        &self.metrics_registry
    }
}

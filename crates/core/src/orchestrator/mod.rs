//! Job orchestrator: the state machine tying ledger, workspaces and workers
//! together.
//!
//! Every transition is committed to the ledger by compare-and-swap before the
//! next stage runs, so a process restart resumes each job from its last
//! committed state.

mod config;
mod runner;
mod service;
mod types;

pub use config::OrchestratorConfig;
pub use runner::JobOrchestrator;
pub use service::JobService;
pub use types::{OrchestratorError, OrchestratorStatus, SubmitJobRequest};

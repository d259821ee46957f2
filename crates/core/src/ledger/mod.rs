//! Durable job ledger: identity, lifecycle state and output manifests.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteLedger;
pub use store::{CreateJobRequest, JobFilter, JobLedger, LedgerError};
pub use types::{Job, JobKind, JobState, SegmentDescriptor};

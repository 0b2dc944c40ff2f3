// crates/server/src/jobs/mod.rs
//! Download jobs.
//!
//! Provides:
//! - `DownloadEngine`: runs one job from creation to terminal state
//! - `JobStore` / `InMemoryJobStore`: newest job per file id, terminal records frozen
//! - `StatusService`: status lookups, `not_found` when no job exists
//! - `LatencyPolicy`: the simulated fulfilment delay

pub mod engine;
pub mod record;
pub mod status;
pub mod store;

pub use engine::{DownloadEngine, EngineError, LatencyPolicy};
pub use record::{JobOutcome, JobRecord, JobTransition, TransitionError, FILE_NOT_FOUND_ERROR};
pub use status::StatusService;
pub use store::{InMemoryJobStore, JobStore, StoreError};

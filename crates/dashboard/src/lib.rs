// crates/dashboard/src/lib.rs
//! delineate dashboard.
//!
//! Starts download jobs against the API and tracks each one with two timers:
//! a local progress estimator and a status poller. A single tracker task
//! merges both into the state that gets rendered.

pub mod api;
pub mod job;
pub mod render;
pub mod tracker;

pub use api::{ApiClient, ClientError, DownloadApi};
pub use job::{estimate_progress, ClientStatus, JobState, Merge, ServerView, TrackedJob};
pub use render::Dashboard;
pub use tracker::{JobTracker, TrackerEvent, TrackerSettings};

// crates/server/src/jobs/engine.rs
//! Job execution engine.
//!
//! A job is: insert a `pending` record, flip it to `in_progress`, sleep for a
//! random latency, ask the oracle once, then finalize as `completed` or
//! `failed`. Oracle errors fail the job; nothing is retried.
//!
//! The job runs on its own task and the caller awaits its handle. If the HTTP
//! request is dropped (client gone, request timeout) the record is still
//! finalized and later status polls see the outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;

use delineate_observability::TraceParent;
use delineate_types::{FileId, JobStatus, StartResponse};

use super::record::{JobOutcome, JobRecord, JobTransition, FILE_NOT_FOUND_ERROR};
use super::store::{JobStore, StoreError};
use crate::metrics;
use crate::oracle::{Availability, AvailabilityOracle};

/// Uniform latency in `[min, max]`, or zero when disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyPolicy {
    min: Duration,
    max: Duration,
    enabled: bool,
}

impl LatencyPolicy {
    pub fn new(min: Duration, max: Duration, enabled: bool) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self { min, max, enabled }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, false)
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, true)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn sample(&self) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("download job task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct DownloadEngine {
    store: Arc<dyn JobStore>,
    oracle: Arc<dyn AvailabilityOracle>,
    latency: LatencyPolicy,
    download_base_url: Arc<str>,
}

impl DownloadEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        oracle: Arc<dyn AvailabilityOracle>,
        latency: LatencyPolicy,
        download_base_url: &str,
    ) -> Self {
        Self {
            store,
            oracle,
            latency,
            download_base_url: Arc::from(download_base_url.trim_end_matches('/')),
        }
    }

    pub fn latency(&self) -> LatencyPolicy {
        self.latency
    }

    /// Run a job for `file_id` and wait for its terminal outcome.
    pub async fn start(
        &self,
        file_id: FileId,
        trace: &TraceParent,
    ) -> Result<StartResponse, EngineError> {
        let engine = self.clone();
        let trace_id = trace.trace_id();
        let handle = tokio::spawn(engine.run(file_id, trace_id).in_current_span());
        Ok(handle.await?)
    }

    #[tracing::instrument(
        name = "download_job",
        skip_all,
        fields(file_id = %file_id, trace_id = %trace_id, job_id = tracing::field::Empty)
    )]
    async fn run(self, file_id: FileId, trace_id: String) -> StartResponse {
        let started = Instant::now();
        let record = JobRecord::new(file_id);
        let job_id = record.job_id.clone();
        tracing::Span::current().record("job_id", job_id.as_str());

        self.store.insert(record);
        let _in_flight = metrics::JobInFlight::enter();
        if let Err(e) = self.store.update(file_id, &job_id, JobTransition::Start) {
            tracing::debug!(error = %e, "Job superseded before it started");
        }

        let delay = self.latency.sample();
        tracing::info!(delay_ms = delay.as_millis() as u64, "Simulating download latency");
        tokio::time::sleep(delay).await;

        let outcome = match self.oracle.check(file_id).await {
            Ok(Availability::Available { key, size }) => JobOutcome::Completed {
                download_url: self.download_url(&key),
                size,
            },
            Ok(Availability::Missing) => JobOutcome::Failed {
                error: FILE_NOT_FOUND_ERROR.to_string(),
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    oracle = self.oracle.name(),
                    trace_id = %trace_id,
                    "Availability check failed, treating file as missing"
                );
                JobOutcome::Failed {
                    error: FILE_NOT_FOUND_ERROR.to_string(),
                }
            }
        };

        let elapsed = started.elapsed();
        let processing_time_ms = elapsed.as_millis() as u64;
        let finish = JobTransition::Finish {
            outcome: outcome.clone(),
            completed_at: Utc::now(),
            duration_ms: processing_time_ms,
        };
        match self.store.update(file_id, &job_id, finish) {
            Ok(_) => {}
            Err(StoreError::Superseded { current, .. }) => {
                tracing::debug!(current_job_id = %current, "Job superseded, newer record left untouched");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to finalize job record"),
        }
        metrics::record_job_finished(outcome.status(), elapsed);

        let seconds = elapsed.as_secs_f64();
        let response = match outcome {
            JobOutcome::Completed { download_url, size } => StartResponse {
                file_id,
                job_id,
                status: JobStatus::Completed,
                download_url: Some(download_url),
                size: Some(size),
                processing_time_ms,
                message: format!("Download ready after {seconds:.1} seconds"),
            },
            JobOutcome::Failed { .. } => StartResponse {
                file_id,
                job_id,
                status: JobStatus::Failed,
                download_url: None,
                size: None,
                processing_time_ms,
                message: format!("File not found after {seconds:.1} seconds of processing"),
            },
        };
        tracing::info!(status = %response.status, processing_time_ms, "Download job finished");
        response
    }

    fn download_url(&self, key: &str) -> String {
        format!(
            "{}/{}?token={}",
            self.download_base_url,
            key,
            uuid::Uuid::new_v4()
        )
    }
}

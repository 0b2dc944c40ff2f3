// crates/server/src/metrics.rs
//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Metric definitions (counters, histograms, gauges)
//! - Helper functions for recording metrics

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use delineate_types::JobStatus;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "Duration of HTTP requests in seconds"
    );

    describe_counter!("downloads_started_total", "Download jobs created");
    describe_counter!(
        "downloads_finished_total",
        "Download jobs that reached a terminal status"
    );
    describe_histogram!(
        "download_processing_seconds",
        "Wall-clock time from job creation to terminal status"
    );
    describe_gauge!("downloads_in_flight", "Download jobs not yet terminal");

    describe_counter!(
        "server_errors_total",
        "5xx responses recorded in the error log"
    );
    describe_counter!(
        "rate_limited_requests_total",
        "Requests rejected with 429"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

/// Record a completed HTTP request.
pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("http_request_duration_seconds", "path" => path.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_server_error(path: &str) {
    counter!("server_errors_total", "path" => path.to_string()).increment(1);
}

pub fn record_rate_limited() {
    counter!("rate_limited_requests_total").increment(1);
}

pub fn record_job_finished(status: JobStatus, elapsed: Duration) {
    counter!("downloads_finished_total", "status" => status.as_str()).increment(1);
    histogram!("download_processing_seconds").record(elapsed.as_secs_f64());
}

/// Counts a job as started and in flight until dropped.
pub struct JobInFlight(());

impl JobInFlight {
    pub fn enter() -> Self {
        counter!("downloads_started_total").increment(1);
        gauge!("downloads_in_flight").increment(1.0);
        Self(())
    }
}

impl Drop for JobInFlight {
    fn drop(&mut self) {
        gauge!("downloads_in_flight").decrement(1.0);
    }
}

/// Collapse ids in paths so label cardinality stays bounded.
pub fn path_label(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                "{file_id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

//! Dashboard client and tracker driven against a real server on a local port.

use std::sync::Arc;
use std::time::Duration;

use delineate_dashboard::{ApiClient, ClientError, ClientStatus, DownloadApi, JobTracker, TrackerSettings};
use delineate_observability::{ErrorLog, TraceParent};
use delineate_server::jobs::LatencyPolicy;
use delineate_server::oracle::MockOracle;
use delineate_server::{create_app, AppState};
use delineate_types::{FileId, FILE_NOT_FOUND_ERROR};

/// Serve a mock-oracle app with no simulated latency; returns its base URL.
async fn spawn_server(errors: ErrorLog) -> String {
    spawn_server_with(errors, LatencyPolicy::disabled()).await
}

async fn spawn_server_with(errors: ErrorLog, latency: LatencyPolicy) -> String {
    let state = AppState::builder(Arc::new(MockOracle))
        .errors(errors)
        .latency(latency)
        .build();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_app(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn id(v: i64) -> FileId {
    FileId::try_from(v).unwrap()
}

fn fast_settings() -> TrackerSettings {
    TrackerSettings {
        progress_interval: Duration::from_millis(10),
        poll_interval: Duration::from_millis(50),
        ..TrackerSettings::default()
    }
}

#[tokio::test]
async fn test_trace_id_correlates_client_and_server_error_logs() {
    let server_errors = ErrorLog::new();
    let base_url = spawn_server(server_errors.clone()).await;
    let client = ApiClient::new(&base_url, ErrorLog::new()).unwrap();

    let trace = TraceParent::generate();
    let err = client.trigger_error(id(70000), Some(&trace)).await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 500, .. }));

    let trace_id = trace.trace_id();
    let client_entries = client.errors().find_by_trace_id(&trace_id);
    let server_entries = server_errors.find_by_trace_id(&trace_id);
    assert_eq!(client_entries.len(), 1);
    assert_eq!(server_entries.len(), 1);
    assert_eq!(server_entries[0].tags["endpoint"], "/v1/download/check");
    assert!(server_entries[0].message.contains("file_id=70000"));
}

#[tokio::test]
async fn test_tracker_reaches_terminal_states() {
    let base_url = spawn_server(ErrorLog::new()).await;
    let client = ApiClient::new(&base_url, ErrorLog::new()).unwrap();
    let errors = client.errors().clone();

    let mut tracker = JobTracker::new(Arc::new(client), fast_settings());
    tracker.track(id(70007));
    tracker.track(id(70001));

    tokio::time::timeout(Duration::from_secs(10), tracker.run_until_idle(|_| {}))
        .await
        .unwrap();

    let done = tracker.job(id(70007)).unwrap();
    assert_eq!(done.status(), ClientStatus::Completed);
    assert_eq!(done.progress, 100.0);
    let view = done.server().unwrap();
    assert!(view.size.unwrap() > 0);
    assert!(view.download_url.as_deref().unwrap().contains("70007.zip?token="));

    let failed = tracker.job(id(70001)).unwrap();
    assert_eq!(failed.status(), ClientStatus::Failed);
    assert!(failed.server().unwrap().download_url.is_none());

    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_status_of_unknown_file_is_not_found() {
    let base_url = spawn_server(ErrorLog::new()).await;
    let client = ApiClient::new(&base_url, ErrorLog::new()).unwrap();

    let status = client.fetch_status(id(12345), None).await.unwrap();
    assert_eq!(status.status.as_str(), "not_found");
    assert!(status.job_id.is_none());
}

#[tokio::test]
async fn test_failed_job_carries_record_error() {
    let base_url = spawn_server(ErrorLog::new()).await;
    let client = Arc::new(ApiClient::new(&base_url, ErrorLog::new()).unwrap());

    let mut tracker = JobTracker::new(client.clone(), fast_settings());
    tracker.track(id(70001));
    tokio::time::timeout(Duration::from_secs(10), tracker.run_until_idle(|_| {}))
        .await
        .unwrap();

    let job = tracker.job(id(70001)).unwrap();
    assert_eq!(job.status(), ClientStatus::Failed);
    let view = job.server().unwrap();
    assert_eq!(view.error.as_deref(), Some(FILE_NOT_FOUND_ERROR));
    assert!(view.completed_at.is_some());

    let record = client.fetch_status(id(70001), None).await.unwrap();
    assert_eq!(view.job_id, record.job_id);
    assert!(view.job_id.is_some());
}

#[tokio::test]
async fn test_failed_job_polled_while_in_progress() {
    let base_url = spawn_server_with(
        ErrorLog::new(),
        LatencyPolicy::fixed(Duration::from_millis(400)),
    )
    .await;
    let client = Arc::new(ApiClient::new(&base_url, ErrorLog::new()).unwrap());

    let mut tracker = JobTracker::new(client.clone(), fast_settings());
    tracker.track(id(70001));
    let mut seen_in_progress_job_id = None;
    tokio::time::timeout(
        Duration::from_secs(10),
        tracker.run_until_idle(|jobs| {
            if let Some(view) = jobs[0].server() {
                if view.status == ClientStatus::InProgress {
                    seen_in_progress_job_id = view.job_id.clone();
                }
            }
        }),
    )
    .await
    .unwrap();

    let job = tracker.job(id(70001)).unwrap();
    assert_eq!(job.status(), ClientStatus::Failed);
    let view = job.server().unwrap();
    assert_eq!(view.error.as_deref(), Some(FILE_NOT_FOUND_ERROR));
    assert!(view.created_at.is_some());
    assert!(view.completed_at.is_some());
    assert!(seen_in_progress_job_id.is_some());
    assert_eq!(view.job_id, seen_in_progress_job_id);

    let record = client.fetch_status(id(70001), None).await.unwrap();
    assert_eq!(view.job_id, record.job_id);
}

#[tokio::test]
async fn test_pending_promoted_to_in_progress_before_completion() {
    let base_url = spawn_server_with(
        ErrorLog::new(),
        LatencyPolicy::fixed(Duration::from_millis(400)),
    )
    .await;
    let client = ApiClient::new(&base_url, ErrorLog::new()).unwrap();

    let mut tracker = JobTracker::new(Arc::new(client), fast_settings());
    tracker.track(id(70007));
    let mut statuses = vec![tracker.job(id(70007)).unwrap().status()];
    tokio::time::timeout(
        Duration::from_secs(10),
        tracker.run_until_idle(|jobs| {
            let status = jobs[0].status();
            if statuses.last() != Some(&status) {
                statuses.push(status);
            }
        }),
    )
    .await
    .unwrap();

    assert_eq!(
        statuses,
        vec![
            ClientStatus::Pending,
            ClientStatus::InProgress,
            ClientStatus::Completed
        ]
    );
    let job = tracker.job(id(70007)).unwrap();
    assert_eq!(job.progress, 100.0);
    assert!(job.server().unwrap().job_id.is_some());
}

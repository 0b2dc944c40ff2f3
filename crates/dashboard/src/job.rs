// crates/dashboard/src/job.rs
//! Client-side view of one download job and the rules for merging updates into it.
//!
//! Two sources feed a job: the local progress timer (`apply_tick`) and the
//! server (`apply_status`, `apply_start_response`). Server status always wins;
//! ticks only move `progress` forward and promote `pending` to `in_progress`
//! once the job has been running for a moment, whoever reported `pending`.
//! Nothing changes a terminal job except its `last_error`.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::time::Instant;

use delineate_observability::TraceParent;
use delineate_types::{
    DownloadStatus, FileId, JobStatus, StartResponse, StatusResponse, FILE_NOT_FOUND_ERROR,
};

/// Progress the estimator never exceeds; only a `completed` status reaches 100.
pub const ESTIMATE_CAP: f64 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    /// Tracking deadline passed without a terminal server status.
    Timeout,
    NotFound,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::Pending => "pending",
            ClientStatus::InProgress => "in_progress",
            ClientStatus::Completed => "completed",
            ClientStatus::Failed => "failed",
            ClientStatus::Timeout => "timeout",
            ClientStatus::NotFound => "not_found",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClientStatus::Pending | ClientStatus::InProgress)
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DownloadStatus> for ClientStatus {
    fn from(status: DownloadStatus) -> Self {
        match status {
            DownloadStatus::Pending => ClientStatus::Pending,
            DownloadStatus::InProgress => ClientStatus::InProgress,
            DownloadStatus::Completed => ClientStatus::Completed,
            DownloadStatus::Failed => ClientStatus::Failed,
            DownloadStatus::NotFound => ClientStatus::NotFound,
        }
    }
}

impl From<JobStatus> for ClientStatus {
    fn from(status: JobStatus) -> Self {
        DownloadStatus::from(status).into()
    }
}

/// Server-reported fields of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerView {
    pub status: ClientStatus,
    pub job_id: Option<String>,
    pub created_at: Option<String>,
    pub completed_at: Option<String>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub download_url: Option<String>,
    pub size: Option<u64>,
    pub message: Option<String>,
}

impl From<StatusResponse> for ServerView {
    fn from(resp: StatusResponse) -> Self {
        Self {
            status: resp.status.into(),
            job_id: resp.job_id,
            created_at: resp.created_at,
            completed_at: resp.completed_at,
            duration_ms: resp.duration.or(resp.processing_time_ms),
            error: resp.error,
            download_url: resp.download_url,
            size: resp.size,
            message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Nothing heard from the server yet.
    Optimistic { status: ClientStatus },
    Confirmed(ServerView),
}

impl JobState {
    pub fn status(&self) -> ClientStatus {
        match self {
            JobState::Optimistic { status } => *status,
            JobState::Confirmed(view) => view.status,
        }
    }

    fn set_status(&mut self, status: ClientStatus) {
        match self {
            JobState::Optimistic { status: s } => *s = status,
            JobState::Confirmed(view) => view.status = status,
        }
    }
}

/// What a merge did, from the tracker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Update arrived too late to matter.
    Ignored,
    Updated,
    /// Stop both timers for this job.
    Stop,
}

#[derive(Debug, Clone)]
pub struct TrackedJob {
    pub file_id: FileId,
    /// Client clock at the user action. Never overwritten.
    pub started: Instant,
    pub started_at: DateTime<Utc>,
    pub trace: TraceParent,
    /// 0 to 100, one decimal.
    pub progress: f64,
    pub state: JobState,
    pub last_error: Option<String>,
}

impl TrackedJob {
    pub fn new(file_id: FileId, trace: TraceParent, now: Instant) -> Self {
        Self {
            file_id,
            started: now,
            started_at: Utc::now(),
            trace,
            progress: 0.0,
            state: JobState::Optimistic {
                status: ClientStatus::Pending,
            },
            last_error: None,
        }
    }

    pub fn status(&self) -> ClientStatus {
        self.state.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn trace_id(&self) -> String {
        self.trace.trace_id()
    }

    pub fn server(&self) -> Option<&ServerView> {
        match &self.state {
            JobState::Confirmed(view) => Some(view),
            JobState::Optimistic { .. } => None,
        }
    }

    /// Progress timer tick.
    pub fn apply_tick(&mut self, now: Instant, average_latency: Duration, promote_after: Duration) -> Merge {
        if self.is_terminal() {
            return Merge::Ignored;
        }
        let elapsed = now.saturating_duration_since(self.started);
        let estimate = estimate_progress(elapsed, average_latency);
        if estimate > self.progress {
            self.progress = estimate;
        }
        if elapsed > promote_after && self.status() == ClientStatus::Pending {
            self.state.set_status(ClientStatus::InProgress);
        }
        Merge::Updated
    }

    /// Poll response. Replaces every server field; `started` is kept.
    pub fn apply_status(&mut self, resp: StatusResponse) -> Merge {
        if self.is_terminal() {
            return Merge::Ignored;
        }
        self.confirm(ServerView::from(resp))
    }

    /// Response of the long-running start request.
    ///
    /// The response carries no timestamps: `created_at` comes from the last
    /// poll and `completed_at` is the client's clock at arrival.
    pub fn apply_start_response(&mut self, resp: StartResponse) -> Merge {
        if self.is_terminal() {
            return Merge::Ignored;
        }
        let status = ClientStatus::from(resp.status);
        let created_at = self.server().and_then(|v| v.created_at.clone());
        let view = ServerView {
            status,
            job_id: Some(resp.job_id),
            created_at,
            completed_at: status
                .is_terminal()
                .then(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            duration_ms: Some(resp.processing_time_ms),
            error: (status == ClientStatus::Failed).then(|| FILE_NOT_FOUND_ERROR.to_string()),
            download_url: resp.download_url,
            size: resp.size,
            message: Some(resp.message),
        };
        self.confirm(view)
    }

    /// The start request failed. Polling carries on.
    pub fn apply_start_failure(&mut self, error: String) -> Merge {
        if self.is_terminal() {
            return Merge::Ignored;
        }
        self.last_error = Some(error);
        Merge::Updated
    }

    /// Polling failed. The job keeps its last known state and stops being tracked.
    pub fn apply_poll_failure(&mut self, error: String) -> Merge {
        if self.is_terminal() {
            return Merge::Ignored;
        }
        self.last_error = Some(error);
        Merge::Stop
    }

    /// Mark the job `timeout` once it has been tracked for longer than `deadline`.
    pub fn apply_deadline(&mut self, now: Instant, deadline: Duration) -> Merge {
        if self.is_terminal() || now.saturating_duration_since(self.started) < deadline {
            return Merge::Ignored;
        }
        self.state.set_status(ClientStatus::Timeout);
        Merge::Stop
    }

    fn confirm(&mut self, view: ServerView) -> Merge {
        let status = view.status;
        self.state = JobState::Confirmed(view);
        if status == ClientStatus::Completed {
            self.progress = 100.0;
        }
        if status.is_terminal() {
            Merge::Stop
        } else {
            Merge::Updated
        }
    }
}

/// `elapsed / average * 100`, clamped to `[0, 95]` and rounded to one decimal.
pub fn estimate_progress(elapsed: Duration, average_latency: Duration) -> f64 {
    if average_latency.is_zero() {
        return ESTIMATE_CAP;
    }
    let raw = elapsed.as_secs_f64() / average_latency.as_secs_f64() * 100.0;
    (raw.clamp(0.0, ESTIMATE_CAP) * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const AVG: Duration = Duration::from_secs(105);
    const PROMOTE: Duration = Duration::from_millis(100);

    fn job() -> (TrackedJob, Instant) {
        let now = Instant::now();
        let id = FileId::try_from(70007_i64).unwrap();
        (TrackedJob::new(id, TraceParent::generate(), now), now)
    }

    fn status(status: DownloadStatus) -> StatusResponse {
        StatusResponse {
            job_id: Some("job-1".to_string()),
            status,
            created_at: Some("2026-01-01T00:00:00.000Z".to_string()),
            ..StatusResponse::not_found(FileId::try_from(70007_i64).unwrap())
        }
    }

    #[test]
    fn test_estimate_progress() {
        assert_eq!(estimate_progress(Duration::ZERO, AVG), 0.0);
        assert_eq!(estimate_progress(Duration::from_millis(10_500), AVG), 10.0);
        assert_eq!(estimate_progress(Duration::from_secs(1), AVG), 1.0);
        assert_eq!(estimate_progress(Duration::from_secs(500), AVG), 95.0);
        assert_eq!(estimate_progress(Duration::from_secs(1), Duration::ZERO), 95.0);
    }

    #[test]
    fn test_new_job_is_optimistic_pending() {
        let (job, _) = job();
        assert_eq!(job.status(), ClientStatus::Pending);
        assert_eq!(job.progress, 0.0);
        assert!(job.server().is_none());
        assert_eq!(job.trace_id().len(), 32);
    }

    #[test]
    fn test_tick_promotes_after_threshold() {
        let (mut job, start) = job();
        job.apply_tick(start + Duration::from_millis(50), AVG, PROMOTE);
        assert_eq!(job.status(), ClientStatus::Pending);

        job.apply_tick(start + Duration::from_millis(150), AVG, PROMOTE);
        assert_eq!(job.status(), ClientStatus::InProgress);
    }

    #[test]
    fn test_tick_never_lowers_progress() {
        let (mut job, start) = job();
        job.apply_tick(start + Duration::from_secs(21), AVG, PROMOTE);
        assert_eq!(job.progress, 20.0);
        // a stale tick computed from an earlier instant
        job.apply_tick(start + Duration::from_secs(1), AVG, PROMOTE);
        assert_eq!(job.progress, 20.0);
        job.apply_tick(start + Duration::from_secs(1000), AVG, PROMOTE);
        assert_eq!(job.progress, 95.0);
    }

    #[test]
    fn test_tick_promotes_server_pending() {
        let (mut job, start) = job();
        assert_eq!(job.apply_status(status(DownloadStatus::Pending)), Merge::Updated);
        job.apply_tick(start + Duration::from_millis(50), AVG, PROMOTE);
        assert_eq!(job.status(), ClientStatus::Pending);

        job.apply_tick(start + Duration::from_secs(5), AVG, PROMOTE);
        assert_eq!(job.status(), ClientStatus::InProgress);
        assert!(job.progress > 0.0);
        let view = job.server().unwrap();
        assert_eq!(view.job_id.as_deref(), Some("job-1"));
        assert_eq!(view.created_at.as_deref(), Some("2026-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_completed_pins_progress_to_100() {
        let (mut job, start) = job();
        job.apply_tick(start + Duration::from_secs(30), AVG, PROMOTE);
        let mut done = status(DownloadStatus::Completed);
        done.download_url = Some("https://storage.example.com/70007.zip?token=t".to_string());
        done.size = Some(4096);

        assert_eq!(job.apply_status(done), Merge::Stop);
        assert_eq!(job.progress, 100.0);
        assert_eq!(job.status(), ClientStatus::Completed);
        assert_eq!(job.server().unwrap().size, Some(4096));
        assert_eq!(job.started, start);

        // terminal is final
        assert_eq!(job.apply_tick(start + Duration::from_secs(60), AVG, PROMOTE), Merge::Ignored);
        assert_eq!(job.apply_status(status(DownloadStatus::InProgress)), Merge::Ignored);
        assert_eq!(job.status(), ClientStatus::Completed);
        assert_eq!(job.progress, 100.0);
    }

    #[test]
    fn test_failed_and_not_found_freeze_progress() {
        for terminal in [DownloadStatus::Failed, DownloadStatus::NotFound] {
            let (mut job, start) = job();
            job.apply_tick(start + Duration::from_secs(21), AVG, PROMOTE);
            assert_eq!(job.apply_status(status(terminal)), Merge::Stop);
            assert_eq!(job.progress, 20.0);
            assert_eq!(job.status(), ClientStatus::from(terminal));
        }
    }

    fn failed_start(file_id: FileId) -> StartResponse {
        StartResponse {
            file_id,
            job_id: "job-2".to_string(),
            status: JobStatus::Failed,
            download_url: None,
            size: None,
            processing_time_ms: 1500,
            message: "File not found after 1.5 seconds of processing".to_string(),
        }
    }

    #[test]
    fn test_failed_start_response_uses_record_error() {
        let (mut job, _) = job();
        job.apply_status(status(DownloadStatus::InProgress));

        let merge = job.apply_start_response(failed_start(job.file_id));
        assert_eq!(merge, Merge::Stop);
        let view = job.server().unwrap();
        assert_eq!(view.job_id.as_deref(), Some("job-2"));
        assert_eq!(view.created_at.as_deref(), Some("2026-01-01T00:00:00.000Z"));
        assert!(view.completed_at.is_some());
        assert_eq!(view.duration_ms, Some(1500));
        assert_eq!(view.error.as_deref(), Some(FILE_NOT_FOUND_ERROR));
        assert_eq!(
            view.message.as_deref(),
            Some("File not found after 1.5 seconds of processing")
        );
    }

    #[test]
    fn test_start_response_before_any_poll() {
        let (mut job, _) = job();
        assert_eq!(job.apply_start_response(failed_start(job.file_id)), Merge::Stop);
        let view = job.server().unwrap();
        assert_eq!(view.job_id.as_deref(), Some("job-2"));
        assert!(view.created_at.is_none());
        let completed_at = view.completed_at.as_deref().unwrap();
        assert!(DateTime::parse_from_rfc3339(completed_at).is_ok());
        assert_eq!(view.error.as_deref(), Some(FILE_NOT_FOUND_ERROR));
    }

    #[test]
    fn test_start_failure_keeps_tracking() {
        let (mut job, _) = job();
        assert_eq!(job.apply_start_failure("HTTP 408".to_string()), Merge::Updated);
        assert_eq!(job.last_error.as_deref(), Some("HTTP 408"));
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_poll_failure_stops_without_terminal_status() {
        let (mut job, start) = job();
        job.apply_tick(start + Duration::from_secs(1), AVG, PROMOTE);
        assert_eq!(job.apply_poll_failure("connection refused".to_string()), Merge::Stop);
        assert_eq!(job.status(), ClientStatus::InProgress);
        assert_eq!(job.last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_deadline_marks_timeout() {
        let (mut job, start) = job();
        let deadline = Duration::from_secs(400);
        job.apply_status(status(DownloadStatus::InProgress));
        assert_eq!(job.apply_deadline(start + Duration::from_secs(399), deadline), Merge::Ignored);
        assert_eq!(job.apply_deadline(start + deadline, deadline), Merge::Stop);
        assert_eq!(job.status(), ClientStatus::Timeout);
        assert_eq!(job.server().unwrap().job_id.as_deref(), Some("job-1"));
    }
}

// crates/dashboard/src/tracker.rs
//! Tracks download jobs with two timers per job.
//!
//! Each tracked job owns a progress timer, a poll timer and the long-running
//! start request. All three run as separate tasks and only send events; the
//! tracker applies every event itself, so job state has a single writer.
//! Events carry the generation of the tracking session that produced them and
//! are dropped once that session is replaced or stopped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use delineate_observability::TraceParent;
use delineate_types::{FileId, StartResponse, StatusResponse};

use crate::api::{ClientError, DownloadApi};
use crate::job::{Merge, TrackedJob};

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub progress_interval: Duration,
    pub poll_interval: Duration,
    /// Local `pending` becomes `in_progress` after this long.
    pub promote_after: Duration,
    /// Server latency bounds the progress estimate is based on.
    pub expected_min: Duration,
    pub expected_max: Duration,
    /// A job still running after this long is marked `timeout`.
    pub deadline: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        let expected_max = Duration::from_secs(200);
        Self {
            progress_interval: Duration::from_millis(100),
            poll_interval: Duration::from_millis(2000),
            promote_after: Duration::from_millis(100),
            expected_min: Duration::from_secs(10),
            expected_max,
            deadline: expected_max * 2,
        }
    }
}

impl TrackerSettings {
    pub fn average_expected_latency(&self) -> Duration {
        (self.expected_min + self.expected_max) / 2
    }
}

#[derive(Debug)]
pub enum TrackerEvent {
    Tick {
        file_id: FileId,
        generation: u64,
    },
    Polled {
        file_id: FileId,
        generation: u64,
        result: Result<StatusResponse, ClientError>,
    },
    Started {
        file_id: FileId,
        generation: u64,
        result: Result<StartResponse, ClientError>,
    },
}

impl TrackerEvent {
    fn source(&self) -> (FileId, u64) {
        match self {
            TrackerEvent::Tick {
                file_id,
                generation,
            }
            | TrackerEvent::Polled {
                file_id,
                generation,
                ..
            }
            | TrackerEvent::Started {
                file_id,
                generation,
                ..
            } => (*file_id, *generation),
        }
    }
}

struct Session {
    generation: u64,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            task.abort();
        }
    }
}

pub struct JobTracker {
    api: Arc<dyn DownloadApi>,
    settings: TrackerSettings,
    /// Most recent first. Jobs stay listed after tracking stops.
    jobs: Vec<TrackedJob>,
    sessions: HashMap<FileId, Session>,
    next_generation: u64,
    events_tx: mpsc::UnboundedSender<TrackerEvent>,
    events_rx: mpsc::UnboundedReceiver<TrackerEvent>,
}

impl JobTracker {
    pub fn new(api: Arc<dyn DownloadApi>, settings: TrackerSettings) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            api,
            settings,
            jobs: Vec::new(),
            sessions: HashMap::new(),
            next_generation: 0,
            events_tx,
            events_rx,
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Start a download and begin tracking it. Returns the trace minted for it.
    ///
    /// The job is listed as `pending` before this returns. Tracking a file id
    /// that is already listed stops the old session and replaces its entry.
    pub fn track(&mut self, file_id: FileId) -> TraceParent {
        if let Some(previous) = self.sessions.remove(&file_id) {
            previous.stop();
        }
        self.jobs.retain(|job| job.file_id != file_id);

        let trace = TraceParent::generate();
        self.jobs.insert(0, TrackedJob::new(file_id, trace, Instant::now()));

        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel = CancellationToken::new();
        let tasks = vec![
            self.spawn_progress_timer(file_id, generation, cancel.clone()),
            self.spawn_poll_timer(file_id, generation, trace, cancel.clone()),
            self.spawn_start_request(file_id, generation, trace, cancel.clone()),
        ];
        self.sessions.insert(
            file_id,
            Session {
                generation,
                cancel,
                tasks,
            },
        );

        tracing::info!(%file_id, trace_id = %trace.trace_id(), generation, "Tracking download");
        trace
    }

    fn spawn_progress_timer(
        &self,
        file_id: FileId,
        generation: u64,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let tx = self.events_tx.clone();
        let period = self.settings.progress_interval;
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(TrackerEvent::Tick { file_id, generation }).is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    fn spawn_poll_timer(
        &self,
        file_id: FileId,
        generation: u64,
        trace: TraceParent,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let tx = self.events_tx.clone();
        let api = Arc::clone(&self.api);
        let period = self.settings.poll_interval;
        tokio::spawn(async move {
            // first poll one full period after the user action
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let result = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = api.fetch_status(file_id, Some(&trace)) => result,
                };
                let event = TrackerEvent::Polled {
                    file_id,
                    generation,
                    result,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        })
    }

    fn spawn_start_request(
        &self,
        file_id: FileId,
        generation: u64,
        trace: TraceParent,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let tx = self.events_tx.clone();
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = api.start_download(file_id, Some(&trace)) => {
                    let _ = tx.send(TrackerEvent::Started { file_id, generation, result });
                }
            }
        })
    }

    /// Apply one event. Stops the job's timers when the merge says so.
    pub fn handle_event(&mut self, event: TrackerEvent) -> Merge {
        let (file_id, generation) = event.source();
        if self.sessions.get(&file_id).map(|s| s.generation) != Some(generation) {
            tracing::trace!(%file_id, generation, "Dropping event from a stopped session");
            return Merge::Ignored;
        }
        let Some(job) = self.jobs.iter_mut().find(|job| job.file_id == file_id) else {
            return Merge::Ignored;
        };

        let now = Instant::now();
        let merge = match event {
            TrackerEvent::Tick { .. } => job.apply_tick(
                now,
                self.settings.average_expected_latency(),
                self.settings.promote_after,
            ),
            TrackerEvent::Polled {
                result: Ok(resp), ..
            } => match job.apply_status(resp) {
                Merge::Stop => Merge::Stop,
                merged => match job.apply_deadline(now, self.settings.deadline) {
                    Merge::Stop => {
                        tracing::warn!(%file_id, trace_id = %job.trace_id(), "Tracking deadline passed");
                        Merge::Stop
                    }
                    _ => merged,
                },
            },
            TrackerEvent::Polled {
                result: Err(err), ..
            } => {
                tracing::warn!(%file_id, trace_id = %job.trace_id(), error = %err, "Status poll failed");
                job.apply_poll_failure(err.to_string())
            }
            TrackerEvent::Started {
                result: Ok(resp), ..
            } => job.apply_start_response(resp),
            TrackerEvent::Started {
                result: Err(err), ..
            } => {
                tracing::warn!(%file_id, trace_id = %job.trace_id(), error = %err, "Start request failed");
                job.apply_start_failure(err.to_string())
            }
        };

        if merge == Merge::Stop {
            tracing::info!(
                %file_id,
                status = %job.status(),
                progress = job.progress,
                "Stopped tracking download"
            );
            if let Some(session) = self.sessions.remove(&file_id) {
                session.stop();
            }
        }
        merge
    }

    /// Wait for and apply the next event. `None` once nothing is tracked.
    pub async fn step(&mut self) -> Option<Merge> {
        if self.sessions.is_empty() {
            return None;
        }
        let event = self.events_rx.recv().await?;
        Some(self.handle_event(event))
    }

    /// Apply events until every job has stopped being tracked, calling
    /// `on_update` after each change.
    pub async fn run_until_idle(&mut self, mut on_update: impl FnMut(&[TrackedJob])) {
        while let Some(merge) = self.step().await {
            if merge != Merge::Ignored {
                on_update(&self.jobs);
            }
        }
    }

    pub fn snapshot(&self) -> &[TrackedJob] {
        &self.jobs
    }

    pub fn job(&self, file_id: FileId) -> Option<&TrackedJob> {
        self.jobs.iter().find(|job| job.file_id == file_id)
    }

    pub fn is_tracking(&self, file_id: FileId) -> bool {
        self.sessions.contains_key(&file_id)
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.stop();
        }
    }
}

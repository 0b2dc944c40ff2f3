// crates/dashboard/src/render.rs
//! Terminal rendering: one progress bar per tracked job, newest on top.

use std::collections::HashMap;

use indicatif::style::TemplateError;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use delineate_types::{ErrorEvent, FileId};

use crate::job::{ClientStatus, TrackedJob};

struct JobBar {
    trace_id: String,
    bar: ProgressBar,
}

pub struct Dashboard {
    multi: MultiProgress,
    bars: HashMap<FileId, JobBar>,
    running: ProgressStyle,
    finished: ProgressStyle,
}

impl Dashboard {
    pub fn new() -> Result<Self, TemplateError> {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub fn with_target(target: ProgressDrawTarget) -> Result<Self, TemplateError> {
        Ok(Self {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
            running: ProgressStyle::with_template(
                "{spinner:.yellow} {prefix:>9} [{bar:40.cyan/blue}] {msg}",
            )?
            .progress_chars("=> "),
            finished: ProgressStyle::with_template("  {prefix:>9} [{bar:40.green/blue}] {msg}")?
                .progress_chars("=> "),
        })
    }

    /// Sync bars with `jobs` (most recent first).
    pub fn update(&mut self, jobs: &[TrackedJob]) {
        for job in jobs.iter().rev() {
            let trace_id = job.trace_id();
            let stale = self
                .bars
                .get(&job.file_id)
                .is_some_and(|existing| existing.trace_id != trace_id);
            if stale {
                if let Some(old) = self.bars.remove(&job.file_id) {
                    self.multi.remove(&old.bar);
                }
            }

            let entry = self.bars.entry(job.file_id).or_insert_with(|| {
                let bar = self.multi.insert(
                    0,
                    ProgressBar::new(100)
                        .with_style(self.running.clone())
                        .with_prefix(job.file_id.to_string()),
                );
                JobBar { trace_id, bar }
            });

            if entry.bar.is_finished() {
                continue;
            }
            entry.bar.set_position(job.progress.round() as u64);
            entry.bar.set_message(job_line(job));
            if job.is_terminal() {
                entry.bar.set_style(self.finished.clone());
                entry.bar.finish();
            } else {
                entry.bar.tick();
            }
        }
    }

    /// Finish any bar still running, e.g. a job whose polling stopped on an error.
    pub fn finish(&mut self) {
        for entry in self.bars.values() {
            if !entry.bar.is_finished() {
                entry.bar.set_style(self.finished.clone());
                entry.bar.finish();
            }
        }
    }
}

/// Status text shown next to a job's bar.
pub fn job_line(job: &TrackedJob) -> String {
    let mut line = format!("{:>5.1}% {}", job.progress, job.status());
    if let Some(view) = job.server() {
        match view.status {
            ClientStatus::Completed => {
                if let Some(size) = view.size {
                    line.push_str(&format!(" {size} bytes"));
                }
                if let Some(url) = &view.download_url {
                    line.push_str(&format!(" {url}"));
                }
            }
            ClientStatus::Failed => {
                if let Some(error) = &view.error {
                    line.push_str(&format!(" ({error})"));
                }
            }
            _ => {}
        }
    }
    if let Some(error) = &job.last_error {
        line.push_str(&format!(" ! {error}"));
    }
    line.push_str(&format!(" trace={}", job.trace_id()));
    line
}

/// One line of the error log listing.
pub fn format_error_entry(event: &ErrorEvent) -> String {
    let mut line = format!("[{}] {}", event.timestamp, event.message);
    if let Some(trace_id) = event.trace_id() {
        line.push_str(&format!(" traceId={trace_id}"));
    }
    if let Some(endpoint) = event.tags.get("endpoint") {
        line.push_str(&format!(" endpoint={endpoint}"));
    }
    line
}

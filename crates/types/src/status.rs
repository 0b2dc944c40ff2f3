// crates/types/src/status.rs
//! Status vocabularies.
//!
//! `JobStatus` is what the server stores. `DownloadStatus` is what the status
//! endpoint reports, which adds `not_found` for "no job was ever created".

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Server-authoritative lifecycle of a stored job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported by `GET /v1/download/status/{file_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    NotFound,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::InProgress => "in_progress",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::NotFound => "not_found",
        }
    }

    /// Statuses after which a poller stops.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::NotFound
        )
    }
}

impl From<JobStatus> for DownloadStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => DownloadStatus::Pending,
            JobStatus::InProgress => DownloadStatus::InProgress,
            JobStatus::Completed => DownloadStatus::Completed,
            JobStatus::Failed => DownloadStatus::Failed,
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// crates/server/src/jobs/record.rs
//! Server-side job record and its allowed transitions.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

pub use delineate_types::FILE_NOT_FOUND_ERROR;
use delineate_types::{FileId, JobStatus, StatusResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: String,
    pub file_id: FileId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub download_url: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { download_url: String, size: u64 },
    Failed { error: String },
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTransition {
    Start,
    Finish {
        outcome: JobOutcome,
        completed_at: DateTime<Utc>,
        duration_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job {job_id} is already {status}")]
    AlreadyTerminal { job_id: String, status: JobStatus },

    #[error("job {job_id} cannot start from {status}")]
    NotPending { job_id: String, status: JobStatus },
}

impl JobRecord {
    /// Fresh `pending` record with a new v4 job id.
    pub fn new(file_id: FileId) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            file_id,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            error: None,
            download_url: None,
            size: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply `transition`. Terminal records reject everything.
    pub fn apply(&mut self, transition: JobTransition) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                job_id: self.job_id.clone(),
                status: self.status,
            });
        }
        match transition {
            JobTransition::Start => {
                if self.status != JobStatus::Pending {
                    return Err(TransitionError::NotPending {
                        job_id: self.job_id.clone(),
                        status: self.status,
                    });
                }
                self.status = JobStatus::InProgress;
            }
            JobTransition::Finish {
                outcome,
                completed_at,
                duration_ms,
            } => {
                self.status = outcome.status();
                self.completed_at = Some(completed_at);
                self.duration_ms = Some(duration_ms);
                match outcome {
                    JobOutcome::Completed { download_url, size } => {
                        self.download_url = Some(download_url);
                        self.size = Some(size);
                    }
                    JobOutcome::Failed { error } => {
                        self.error = Some(error);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn to_status_response(&self) -> StatusResponse {
        StatusResponse {
            file_id: self.file_id,
            job_id: Some(self.job_id.clone()),
            status: self.status.into(),
            created_at: Some(self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            completed_at: self
                .completed_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            duration: self.duration_ms,
            error: self.error.clone(),
            download_url: self.download_url.clone(),
            size: self.size,
            processing_time_ms: self.duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delineate_types::DownloadStatus;

    fn record() -> JobRecord {
        JobRecord::new(FileId::try_from(70007_i64).unwrap())
    }

    fn finish(outcome: JobOutcome) -> JobTransition {
        JobTransition::Finish {
            outcome,
            completed_at: Utc::now(),
            duration_ms: 1_500,
        }
    }

    #[test]
    fn test_lifecycle_to_completed() {
        let mut job = record();
        assert_eq!(job.status, JobStatus::Pending);
        job.apply(JobTransition::Start).unwrap();
        assert_eq!(job.status, JobStatus::InProgress);

        job.apply(finish(JobOutcome::Completed {
            download_url: "https://storage.example.com/70007.zip?token=t".to_string(),
            size: 2048,
        }))
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.size, Some(2048));
        assert_eq!(job.duration_ms, Some(1_500));
        assert!(job.error.is_none());
    }

    #[test]
    fn test_terminal_record_is_immutable() {
        let mut job = record();
        job.apply(JobTransition::Start).unwrap();
        job.apply(finish(JobOutcome::Failed {
            error: FILE_NOT_FOUND_ERROR.to_string(),
        }))
        .unwrap();
        let frozen = job.clone();

        let err = job
            .apply(finish(JobOutcome::Completed {
                download_url: "x".to_string(),
                size: 1,
            }))
            .unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyTerminal { .. }));
        assert!(job.apply(JobTransition::Start).is_err());
        assert_eq!(job, frozen);
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut job = record();
        job.apply(JobTransition::Start).unwrap();
        assert!(matches!(
            job.apply(JobTransition::Start),
            Err(TransitionError::NotPending { .. })
        ));
    }

    #[test]
    fn test_status_response_of_failed_job() {
        let mut job = record();
        job.apply(JobTransition::Start).unwrap();
        job.apply(finish(JobOutcome::Failed {
            error: FILE_NOT_FOUND_ERROR.to_string(),
        }))
        .unwrap();

        let response = job.to_status_response();
        assert_eq!(response.status, DownloadStatus::Failed);
        assert_eq!(response.error.as_deref(), Some(FILE_NOT_FOUND_ERROR));
        assert_eq!(response.duration, Some(1_500));
        assert_eq!(response.processing_time_ms, Some(1_500));
        assert!(response.download_url.is_none());
        assert!(response.completed_at.is_some());
    }
}

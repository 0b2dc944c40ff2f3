// crates/server/src/jobs/store.rs
//! Job record store: one record per file id, newest job wins.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use delineate_types::FileId;

use super::record::{JobRecord, JobTransition, TransitionError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no job recorded for file {0}")]
    Missing(FileId),

    #[error("job {job_id} for file {file_id} was superseded by {current}")]
    Superseded {
        file_id: FileId,
        job_id: String,
        current: String,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("job store lock poisoned")]
    Poisoned,
}

pub trait JobStore: Send + Sync {
    /// Insert `record`, replacing whatever job the file had before.
    fn insert(&self, record: JobRecord);

    fn get(&self, file_id: FileId) -> Option<JobRecord>;

    /// Apply `transition` to job `job_id` of `file_id`, returning the new record.
    ///
    /// Fails when a newer job owns the file or the record is already terminal.
    fn update(
        &self,
        file_id: FileId,
        job_id: &str,
        transition: JobTransition,
    ) -> Result<JobRecord, StoreError>;
}

/// `RwLock<HashMap>` store. No guard is ever held across an `.await`.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    records: RwLock<HashMap<FileId, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        match self.records.read() {
            Ok(records) => records.len(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading job records: {e}");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, record: JobRecord) {
        match self.records.write() {
            Ok(mut records) => {
                if let Some(previous) = records.insert(record.file_id, record) {
                    tracing::debug!(
                        file_id = %previous.file_id,
                        job_id = %previous.job_id,
                        status = %previous.status,
                        "Job record superseded"
                    );
                }
            }
            Err(e) => tracing::error!("RwLock poisoned writing job records: {e}"),
        }
    }

    fn get(&self, file_id: FileId) -> Option<JobRecord> {
        match self.records.read() {
            Ok(records) => records.get(&file_id).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading job records: {e}");
                None
            }
        }
    }

    fn update(
        &self,
        file_id: FileId,
        job_id: &str,
        transition: JobTransition,
    ) -> Result<JobRecord, StoreError> {
        let mut records = self.records.write().map_err(|e| {
            tracing::error!("RwLock poisoned writing job records: {e}");
            StoreError::Poisoned
        })?;
        let record = records.get_mut(&file_id).ok_or(StoreError::Missing(file_id))?;
        if record.job_id != job_id {
            return Err(StoreError::Superseded {
                file_id,
                job_id: job_id.to_string(),
                current: record.job_id.clone(),
            });
        }
        record.apply(transition)?;
        Ok(record.clone())
    }
}

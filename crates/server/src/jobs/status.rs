// crates/server/src/jobs/status.rs
//! Read-only status lookups. A file with no job is `not_found`, not an error.

use std::sync::Arc;

use delineate_types::{FileId, StatusResponse};

use super::store::JobStore;

#[derive(Clone)]
pub struct StatusService {
    store: Arc<dyn JobStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, file_id: FileId) -> StatusResponse {
        self.store
            .get(file_id)
            .map(|record| record.to_status_response())
            .unwrap_or_else(|| StatusResponse::not_found(file_id))
    }
}

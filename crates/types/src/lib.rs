// crates/types/src/lib.rs
//! Wire types shared by the delineate server and dashboard.
//!
//! Field naming follows the public API: `file_id` stays snake_case, every
//! other field is camelCase.

pub mod download;
pub mod error_event;
pub mod file_id;
pub mod status;

pub use download::{
    CheckRequest, CheckResponse, CheckState, HealthChecks, HealthResponse, HealthState, InitiateRequest,
    InitiateResponse, MessageResponse, StartRequest, StartResponse, StatusResponse, FILE_NOT_FOUND_ERROR,
};
pub use error_event::{ErrorEvent, ErrorLevel, TRACE_ID_TAG};
pub use file_id::{FileId, FileIdError};
pub use status::{DownloadStatus, JobStatus};

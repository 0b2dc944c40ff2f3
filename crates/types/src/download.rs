// crates/types/src/download.rs
//! Request and response bodies of the download API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::file_id::FileId;
use crate::status::{DownloadStatus, JobStatus};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Body of `POST /v1/download/check`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct CheckRequest {
    pub file_id: FileId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    #[serde(rename = "file_id")]
    pub file_id: FileId,
    pub available: bool,
    pub s3_key: Option<String>,
    pub size: Option<u64>,
}

/// Body of `POST /v1/download/start`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct StartRequest {
    pub file_id: FileId,
}

/// Error recorded on a job whose file is not in storage.
pub const FILE_NOT_FOUND_ERROR: &str = "File not found in storage";

/// Final outcome of a download job, returned once the simulated latency has elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    #[serde(rename = "file_id")]
    pub file_id: FileId,
    pub job_id: String,
    pub status: JobStatus,
    pub download_url: Option<String>,
    pub size: Option<u64>,
    pub processing_time_ms: u64,
    pub message: String,
}

/// Body of `POST /v1/download/initiate`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InitiateRequest {
    pub file_ids: Vec<FileId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub job_id: String,
    pub status: String,
    pub total_file_ids: usize,
}

/// Response of `GET /v1/download/status/{file_id}`.
///
/// Everything except `file_id` and `status` is absent when no job exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(rename = "file_id")]
    pub file_id: FileId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub status: DownloadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

impl StatusResponse {
    pub fn not_found(file_id: FileId) -> Self {
        Self {
            file_id,
            job_id: None,
            status: DownloadStatus::NotFound,
            created_at: None,
            completed_at: None,
            duration: None,
            error: None,
            download_url: None,
            size: None,
            processing_time_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthChecks {
    pub storage: CheckState,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthState,
    pub checks: HealthChecks,
}

impl HealthResponse {
    pub fn from_storage(storage_ok: bool) -> Self {
        if storage_ok {
            Self {
                status: HealthState::Healthy,
                checks: HealthChecks {
                    storage: CheckState::Ok,
                },
            }
        } else {
            Self {
                status: HealthState::Unhealthy,
                checks: HealthChecks {
                    storage: CheckState::Error,
                },
            }
        }
    }
}

// crates/types/src/error_event.rs
//! Error-log entries shown to users.
//!
//! Both the server (`GET /v1/errors`) and the dashboard keep a list of these.
//! The `traceId` tag links an entry to the distributed trace of the request
//! that failed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Tag key carrying the 32-hex-char trace identifier.
pub const TRACE_ID_TAG: &str = "traceId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorEvent {
    pub id: String,
    pub message: String,
    pub level: ErrorLevel,
    pub timestamp: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl ErrorEvent {
    /// New error-level entry stamped with the current time.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            message: message.into(),
            level: ErrorLevel::Error,
            timestamp: chrono::Utc::now().to_rfc3339(),
            tags: BTreeMap::new(),
            extra: None,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_trace_id(self, trace_id: impl Into<String>) -> Self {
        self.with_tag(TRACE_ID_TAG, trace_id)
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.tags.get(TRACE_ID_TAG).map(String::as_str)
    }
}

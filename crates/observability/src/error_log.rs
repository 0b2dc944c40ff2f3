// crates/observability/src/error_log.rs
//! Bounded in-memory error log, most recent first.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use delineate_types::ErrorEvent;

/// Shared handle; clones see the same entries.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    entries: Arc<Mutex<VecDeque<ErrorEvent>>>,
    capacity: usize,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorLog {
    pub const DEFAULT_CAPACITY: usize = 50;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Prepend `event`, dropping the oldest entry once full.
    pub fn record(&self, event: ErrorEvent) {
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.push_front(event);
                entries.truncate(self.capacity);
            }
            Err(e) => {
                tracing::error!("ErrorLog lock poisoned, dropping entry: {e}");
            }
        }
    }

    pub fn entries(&self) -> Vec<ErrorEvent> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().cloned().collect(),
            Err(e) => {
                tracing::error!("ErrorLog lock poisoned: {e}");
                Vec::new()
            }
        }
    }

    pub fn find_by_trace_id(&self, trace_id: &str) -> Vec<ErrorEvent> {
        self.entries()
            .into_iter()
            .filter(|event| event.trace_id() == Some(trace_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

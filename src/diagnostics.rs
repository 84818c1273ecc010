//! Bounded in-memory error log.
//!
//! Each session owns its own [`ErrorLog`]; nothing here is process-wide.

use crate::error::FeedError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::error;

/// One recorded failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorEntry {
    pub at: DateTime<Utc>,
    /// Where the error happened, e.g. `subscription:u2`.
    pub context: String,
    pub error: FeedError,
}

/// Ring buffer of recent errors. The oldest entry is dropped on overflow.
pub struct ErrorLog {
    capacity: usize,
    entries: Mutex<VecDeque<ErrorEntry>>,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Record an error and emit it through `tracing`.
    pub fn record(&self, context: impl Into<String>, err: &FeedError) {
        let context = context.into();
        error!(context = %context, error = %err, "Feed error");

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(ErrorEntry {
            at: Utc::now(),
            context,
            error: err.clone(),
        });
    }

    /// Entries oldest first.
    pub fn recent(&self) -> Vec<ErrorEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn last(&self) -> Option<ErrorEntry> {
        self.entries.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

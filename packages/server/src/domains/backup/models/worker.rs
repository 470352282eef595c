use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domains::backup::protocol::{Message, WorkerStatus};

/// One entry in a worker's append-only message log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub received_at: DateTime<Utc>,
    pub message: Message,
    /// Resolved human-readable text for error messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Mutable progress state of one crawler worker within a job.
#[derive(Debug, Clone)]
pub struct Worker {
    pub tag: String,
    pub status: WorkerStatus,
    pub total_items: Option<u64>,
    pub finished_items: u64,
    pub postponed_items: u64,
    pub error_count: u64,
    pub message_log: Vec<LogEntry>,
}

impl Worker {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            status: WorkerStatus::Other,
            total_items: None,
            finished_items: 0,
            postponed_items: 0,
            error_count: 0,
            message_log: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == WorkerStatus::Done
    }

    pub fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            tag: self.tag.clone(),
            status: self.status,
            total_items: self.total_items,
            finished_items: self.finished_items,
            postponed_items: self.postponed_items,
            error_count: self.error_count,
            log_len: self.message_log.len(),
        }
    }
}

/// Point-in-time copy of a worker's counters, without the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub tag: String,
    pub status: WorkerStatus,
    pub total_items: Option<u64>,
    pub finished_items: u64,
    pub postponed_items: u64,
    pub error_count: u64,
    pub log_len: usize,
}

//! Applies decoded status messages to a worker.
//!
//! | Message          | Guard           | Effect                                       |
//! |------------------|-----------------|----------------------------------------------|
//! | Handshake        |                 | log                                          |
//! | Preflight        |                 | set total, log                               |
//! | Progress         | status != Done  | set status (and counters for PagesMain), log |
//! | ErrorFatal       |                 | status = FatalError, errors += 1, log        |
//! | ErrorNonfatal    |                 | errors += 1, log                             |
//! | FinishSuccess    |                 | status = Done, log                           |
//! | PageDone/Postp.  |                 | nothing (unused by the orchestrator)         |
//!
//! The caller holds the worker's cell lock for the duration of [`apply`].

use chrono::{DateTime, Utc};

use super::models::{LogEntry, Worker};
use super::protocol::{Message, MessageKind, ProgressUpdate, WorkerStatus};

/// What applying a message did to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Only appended to the log.
    Logged,
    TotalSet(u64),
    StatusChanged {
        from: WorkerStatus,
        to: WorkerStatus,
    },
    /// Progress arrived after the worker finished; dropped.
    StaleProgress,
    ErrorRecorded {
        fatal: bool,
        detail: String,
    },
    Finished,
    /// Message type the orchestrator does not act on. Nothing was changed.
    Unhandled,
}

pub fn apply(worker: &mut Worker, message: &Message, now: DateTime<Utc>) -> Effect {
    let (effect, detail) = match &message.kind {
        MessageKind::Handshake => (Effect::Logged, None),
        MessageKind::Preflight { total } => {
            worker.total_items = Some(*total);
            worker.finished_items = clamp(worker.finished_items, worker.total_items);
            (Effect::TotalSet(*total), None)
        }
        MessageKind::Progress(update) => {
            if worker.is_done() {
                return Effect::StaleProgress;
            }
            if let ProgressUpdate::PagesMain { done, postponed } = update {
                worker.finished_items = clamp(*done, worker.total_items);
                worker.postponed_items = *postponed;
            }
            let from = worker.status;
            worker.status = update.status();
            (
                Effect::StatusChanged {
                    from,
                    to: worker.status,
                },
                None,
            )
        }
        MessageKind::ErrorFatal(error) => {
            worker.status = WorkerStatus::FatalError;
            worker.error_count += 1;
            let detail = error.describe();
            (
                Effect::ErrorRecorded {
                    fatal: true,
                    detail: detail.clone(),
                },
                Some(detail),
            )
        }
        MessageKind::ErrorNonfatal(error) => {
            worker.error_count += 1;
            let detail = error.describe();
            (
                Effect::ErrorRecorded {
                    fatal: false,
                    detail: detail.clone(),
                },
                Some(detail),
            )
        }
        MessageKind::FinishSuccess => {
            worker.status = WorkerStatus::Done;
            (Effect::Finished, None)
        }
        MessageKind::PageDone | MessageKind::PagePostponed => return Effect::Unhandled,
    };

    worker.message_log.push(LogEntry {
        received_at: now,
        message: message.clone(),
        detail,
    });
    effect
}

/// Keep finished counts within the known total.
fn clamp(done: u64, total: Option<u64>) -> u64 {
    match total {
        Some(total) => done.min(total),
        None => done,
    }
}

//! Inbound status message handling.
//!
//! Each message is decoded, applied to its worker under that worker's lock
//! and followed by a completion check. The message that completes the job
//! waits for finalization, which runs on its own task: dropping the caller
//! (a disconnected HTTP client) never cuts a claimed finalization short.

use std::sync::Arc;

use chrono::Utc;

use super::completion::{self, Completion, JobSlot};
use super::error::BackupError;
use super::finalize::{FinalizationPipeline, FinalizationSummary};
use super::models::WorkerSummary;
use super::protocol::{self, Message};
use super::state_machine::{self, Effect};

#[derive(Debug)]
pub enum IngestOutcome {
    Applied(Effect),
    /// This message completed the job and finalization succeeded.
    Finalized(FinalizationSummary),
    /// This message completed the job but finalization failed. The message
    /// itself was still applied.
    FinalizationFailed(BackupError),
}

pub struct StatusIngest {
    slot: Arc<JobSlot>,
    pipeline: Arc<FinalizationPipeline>,
}

impl StatusIngest {
    pub fn new(slot: Arc<JobSlot>, pipeline: Arc<FinalizationPipeline>) -> Self {
        Self { slot, pipeline }
    }

    /// Decode raw bytes and apply them. Rejected messages change nothing.
    pub async fn ingest(&self, raw: &[u8]) -> Result<IngestOutcome, BackupError> {
        let message = protocol::decode(raw).map_err(|e| {
            tracing::warn!(error = %e, raw = e.raw().unwrap_or_default(), "Rejected status message");
            e
        })?;
        self.apply(message).await
    }

    pub async fn apply(&self, message: Message) -> Result<IngestOutcome, BackupError> {
        let job = self.slot.current().ok_or_else(|| {
            tracing::warn!(tag = %message.tag, "Status message received while no backup is running");
            BackupError::UnknownWorker {
                tag: message.tag.clone(),
            }
        })?;
        let cell = job.registry().get(&message.tag).map_err(|e| {
            tracing::warn!(tag = %message.tag, job_id = %job.job_id, "Status message for unknown worker");
            e
        })?;

        // Scoped so the guard is released before any await below
        let effect = {
            let mut worker = cell.lock();
            state_machine::apply(&mut worker, &message, Utc::now())
        };

        match &effect {
            Effect::Unhandled => {
                return Err(BackupError::UnhandledMessage(message.message_type()));
            }
            Effect::StaleProgress => {
                tracing::debug!(tag = %message.tag, "Ignoring progress from a finished worker");
                return Ok(IngestOutcome::Applied(effect));
            }
            Effect::ErrorRecorded { fatal: true, detail } => {
                tracing::error!(tag = %message.tag, detail = %detail, "Worker reported a fatal error");
            }
            Effect::ErrorRecorded { fatal: false, detail } => {
                tracing::warn!(tag = %message.tag, detail = %detail, "Worker reported an error");
            }
            Effect::StatusChanged { from, to } if from != to => {
                tracing::info!(tag = %message.tag, status = to.describe(), "Worker status changed");
            }
            Effect::Finished => tracing::info!(tag = %message.tag, "Worker finished"),
            _ => tracing::debug!(tag = %message.tag, effect = ?effect, "Status message applied"),
        }

        match completion::check(&job) {
            Completion::Finalize => {
                let job_id = job.job_id;
                tracing::info!(job_id = %job_id, "All workers done");
                let pipeline = self.pipeline.clone();
                let slot = self.slot.clone();
                let finalizing = tokio::spawn(async move {
                    let result = pipeline.run(&job).await;
                    slot.release(job.job_id);
                    result
                });

                let result = finalizing
                    .await
                    .unwrap_or_else(|e| Err(BackupError::FinalizationAborted(e.to_string())));
                Ok(match result {
                    Ok(summary) => IngestOutcome::Finalized(summary),
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "Finalization failed");
                        IngestOutcome::FinalizationFailed(e)
                    }
                })
            }
            Completion::AlreadyFinalizing => {
                tracing::debug!(job_id = %job.job_id, "Finalization already claimed");
                Ok(IngestOutcome::Applied(effect))
            }
            Completion::Pending { remaining } => {
                tracing::debug!(job_id = %job.job_id, remaining, "Workers still running");
                Ok(IngestOutcome::Applied(effect))
            }
        }
    }

    /// Current worker summaries, empty when no job is running.
    pub fn statuses(&self) -> Vec<WorkerSummary> {
        self.slot
            .current()
            .map(|job| job.registry().all())
            .unwrap_or_default()
    }
}

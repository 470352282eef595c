//! Completion detection for the running job.
//!
//! A job is complete once its registry is non-empty and every worker reports
//! `Done`. Exactly one caller may act on that: the first to flip the job's
//! finalization flag wins, everyone after sees `AlreadyFinalizing`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::protocol::WorkerStatus;
use super::registry::WorkerRegistry;
use crate::common::BackupJobId;

/// In-memory state of the job currently being run.
///
/// A fresh value is built for every start, so nothing from a previous job
/// (worker cells or the finalization flag) leaks into the next one.
#[derive(Debug)]
pub struct ActiveJob {
    pub job_id: BackupJobId,
    pub started_at: DateTime<Utc>,
    registry: WorkerRegistry,
    finalize_started: AtomicBool,
}

impl ActiveJob {
    pub fn new<I, S>(job_id: BackupJobId, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            job_id,
            started_at: Utc::now(),
            registry: WorkerRegistry::with_tags(tags),
            finalize_started: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Returns true exactly once per job.
    pub fn try_claim_finalization(&self) -> bool {
        self.finalize_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_finalizing(&self) -> bool {
        self.finalize_started.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Workers still running.
    Pending { remaining: usize },
    /// Caller won the claim and must run finalization.
    Finalize,
    /// Complete, but another caller is already finalizing.
    AlreadyFinalizing,
}

/// Check whether `job` is complete and, if so, try to claim finalization.
///
/// Cells are read one at a time; no two cell locks are ever held together.
pub fn check(job: &ActiveJob) -> Completion {
    let workers = job.registry.all();
    if workers.is_empty() {
        return Completion::Pending { remaining: 0 };
    }

    let remaining = workers
        .iter()
        .filter(|w| w.status != WorkerStatus::Done)
        .count();
    if remaining > 0 {
        return Completion::Pending { remaining };
    }

    if job.try_claim_finalization() {
        Completion::Finalize
    } else {
        Completion::AlreadyFinalizing
    }
}

/// Holder for the job currently being run, if any.
#[derive(Debug, Default)]
pub struct JobSlot {
    current: RwLock<Option<Arc<ActiveJob>>>,
}

impl JobSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<ActiveJob>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn install(&self, job: Arc<ActiveJob>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(job);
    }

    /// Empty the slot if it still holds `job_id`. Returns whether it did.
    pub fn release(&self, job_id: BackupJobId) -> bool {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        match current.as_ref() {
            Some(job) if job.job_id == job_id => {
                *current = None;
                true
            }
            _ => false,
        }
    }

    /// Empty the slot unconditionally, returning what it held.
    pub fn take(&self) -> Option<Arc<ActiveJob>> {
        self.current.write().unwrap_or_else(|e| e.into_inner()).take()
    }
}

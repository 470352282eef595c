//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! Currently a single task: the automatic backup.
//!
//! ```text
//! Scheduler (every minute)
//!     │
//!     └─► latest job finished and older than the interval?
//!             └─► BackupService::start(initiator = "scheduler")
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::backup::models::BackupJob;
use crate::domains::backup::{BackupError, BackupService};

/// Initiator recorded on jobs started by the scheduler.
pub const SCHEDULER_INITIATOR: &str = "scheduler";

/// Start all scheduled tasks
pub async fn start_scheduler(service: Arc<BackupService>, interval: Duration) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let backup_job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let service = service.clone();
        Box::pin(async move {
            if let Err(e) = run_auto_backup(&service, interval).await {
                tracing::error!(error = %e, "Automatic backup task failed");
            }
        })
    })?;

    scheduler.add(backup_job).await?;
    scheduler.start().await?;

    tracing::info!(
        interval_secs = interval.as_secs(),
        "Scheduled tasks started (automatic backup checked every minute)"
    );
    Ok(scheduler)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoBackup {
    /// No backup was ever made; the first one has to be started by hand.
    NoHistory,
    Running,
    NotDue,
    Due,
}

/// Decide whether an automatic backup should start now.
pub fn auto_backup_decision(
    latest: Option<&BackupJob>,
    interval: Duration,
    now: DateTime<Utc>,
) -> AutoBackup {
    let Some(latest) = latest else {
        return AutoBackup::NoHistory;
    };
    if !latest.is_finished {
        return AutoBackup::Running;
    }

    let interval = match chrono::Duration::from_std(interval) {
        Ok(interval) => interval,
        Err(_) => return AutoBackup::NotDue,
    };
    if latest.started_at + interval < now {
        AutoBackup::Due
    } else {
        AutoBackup::NotDue
    }
}

async fn run_auto_backup(service: &BackupService, interval: Duration) -> Result<()> {
    let latest = service.latest_job().await?;

    match auto_backup_decision(latest.as_ref(), interval, Utc::now()) {
        AutoBackup::NoHistory => {
            tracing::debug!("No previous backup, skipping automatic backup");
            Ok(())
        }
        AutoBackup::Running => {
            tracing::debug!("Previous backup unfinished, skipping automatic backup");
            Ok(())
        }
        AutoBackup::NotDue => Ok(()),
        AutoBackup::Due => {
            tracing::info!("Starting automatic backup");
            match service.start(Some(SCHEDULER_INITIATOR)).await {
                Ok(started) => {
                    tracing::info!(job_id = %started.job_id, "Automatic backup started");
                    Ok(())
                }
                // Lost a race with a manual start
                Err(BackupError::JobAlreadyRunning(_)) => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
    }
}

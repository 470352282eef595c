//! Starting and abandoning backup jobs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use super::completion::{ActiveJob, JobSlot};
use super::error::BackupError;
use crate::common::{BackupJobId, SiteId};
use crate::config::BackupSettings;
use crate::kernel::{BaseJobStore, BaseLauncher, BaseSiteStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedJob {
    pub job_id: BackupJobId,
    pub workers: Vec<String>,
}

pub struct JobController {
    store: Arc<dyn BaseJobStore>,
    sites: Arc<dyn BaseSiteStore>,
    /// `None` when no launch method is configured
    launcher: Option<Arc<dyn BaseLauncher>>,
    settings: BackupSettings,
    slot: Arc<JobSlot>,
    // Serializes starts so two callers cannot both pass the unfinished-job check
    start_lock: Mutex<()>,
}

impl JobController {
    pub fn new(
        store: Arc<dyn BaseJobStore>,
        sites: Arc<dyn BaseSiteStore>,
        launcher: Option<Arc<dyn BaseLauncher>>,
        settings: BackupSettings,
        slot: Arc<JobSlot>,
    ) -> Self {
        Self {
            store,
            sites,
            launcher,
            settings,
            slot,
            start_lock: Mutex::new(()),
        }
    }

    /// Start a new job and launch the crawler fleet.
    ///
    /// Returns as soon as the launcher reports the fleet running. Any
    /// failure after the job record exists removes the record again.
    pub async fn start(&self, initiator: Option<&str>) -> Result<StartedJob, BackupError> {
        let _guard = self.start_lock.lock().await;

        if let Some(running) = self
            .store
            .find_unfinished()
            .await
            .map_err(BackupError::Store)?
        {
            tracing::warn!(job_id = %running.id, "Refusing to start, a backup is already running");
            return Err(BackupError::JobAlreadyRunning(running.id));
        }

        let launcher = match (self.settings.launch_method, &self.launcher) {
            (Some(_), Some(launcher)) => launcher.clone(),
            _ => {
                tracing::error!("Backup start method not set or invalid");
                return Err(BackupError::LaunchMethodInvalid);
            }
        };

        if !self.settings.paths_configured() {
            tracing::error!("One or more backup paths are missing");
            return Err(BackupError::PathsMissing);
        }

        if !launcher.is_configured() {
            tracing::error!(launcher = launcher.name(), "Launcher is not configured");
            return Err(BackupError::LauncherNotConfigured(launcher.name().to_string()));
        }

        if launcher.requires_login() {
            with_timeout(self.settings.launch_timeout, launcher.login())
                .await
                .map_err(|e| {
                    tracing::error!(launcher = launcher.name(), error = %e, "Launcher login failed");
                    BackupError::LauncherLogin(e)
                })?;
            tracing::info!(launcher = launcher.name(), "Launcher login succeeded");
        }

        let sites = self
            .sites
            .active_sites()
            .await
            .map_err(BackupError::Store)?;
        if sites.is_empty() {
            return Err(BackupError::NoActiveSites);
        }
        let site_ids: Vec<SiteId> = sites.iter().map(|s| s.id).collect();
        let tags: Vec<String> = sites.iter().map(|s| s.name.clone()).collect();
        tracing::info!(count = tags.len(), "Sites marked for backup");

        let record = self
            .store
            .create(initiator, &site_ids)
            .await
            .map_err(BackupError::Store)?;
        let job = Arc::new(ActiveJob::new(record.id, tags.clone()));
        self.slot.install(job.clone());

        tracing::info!(job_id = %record.id, launcher = launcher.name(), "Starting crawler");
        if let Err(e) = with_timeout(self.settings.launch_timeout, launcher.start()).await {
            tracing::error!(job_id = %record.id, error = %e, "Crawler failed to start, rolling back");
            self.rollback(&job).await;
            return Err(BackupError::LauncherStart(e));
        }

        tracing::info!(job_id = %record.id, workers = tags.len(), "Backup started");
        Ok(StartedJob {
            job_id: record.id,
            workers: tags,
        })
    }

    async fn rollback(&self, job: &ActiveJob) {
        match self.store.delete(job.job_id).await {
            Ok(_) => {}
            Err(e) => tracing::error!(job_id = %job.job_id, error = %e, "Failed to delete job record"),
        }
        self.slot.release(job.job_id);
        job.registry().clear();
    }

    /// Operator intervention: close the unfinished job without an archive,
    /// drop its workers and ask the launcher to stop the crawler.
    ///
    /// A failed stop is logged only; the job is abandoned either way.
    pub async fn abandon(&self) -> Result<Option<BackupJobId>, BackupError> {
        let _guard = self.start_lock.lock().await;

        let abandoned = self
            .store
            .abandon_unfinished()
            .await
            .map_err(BackupError::Store)?;
        let was_running = match self.slot.take() {
            Some(job) => {
                job.registry().clear();
                true
            }
            None => false,
        };

        if abandoned.is_some() || was_running {
            if let Some(launcher) = &self.launcher {
                if let Err(e) = with_timeout(self.settings.launch_timeout, launcher.stop()).await {
                    tracing::warn!(launcher = launcher.name(), error = %e, "Failed to stop crawler");
                }
            }
        }

        match abandoned {
            Some(id) => tracing::warn!(job_id = %id, "Backup abandoned"),
            None => tracing::info!("Abandon requested but no backup was running"),
        }
        Ok(abandoned)
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }
}

/// Run a launcher call bounded by `timeout`, flattening both failure modes
/// into a message.
async fn with_timeout<F>(timeout: Duration, call: F) -> Result<(), String>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", timeout)),
    }
}

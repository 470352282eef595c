use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::completion::JobSlot;
use super::controller::{JobController, StartedJob};
use super::error::BackupError;
use super::finalize::{signature_path, FinalizationPipeline};
use super::ingest::{IngestOutcome, StatusIngest};
use super::models::{parse_site_list, site_tag, BackupJob, Site, WorkerSummary};
use super::protocol::Message;
use crate::common::BackupJobId;
use crate::config::BackupSettings;
use crate::kernel::signer::FingerprintCache;
use crate::kernel::{
    BaseArchiver, BaseJobStore, BaseLauncher, BaseNotifier, BaseSigner, BaseSiteStore,
};

/// Everything the backup orchestrator needs from the outside world.
pub struct BackupDeps {
    pub store: Arc<dyn BaseJobStore>,
    pub sites: Arc<dyn BaseSiteStore>,
    pub launcher: Option<Arc<dyn BaseLauncher>>,
    pub archiver: Arc<dyn BaseArchiver>,
    pub signer: Arc<dyn BaseSigner>,
    pub notifier: Arc<dyn BaseNotifier>,
    pub fingerprints: Arc<FingerprintCache>,
}

/// Entry point used by the HTTP routes, the socket listener and the
/// scheduler.
pub struct BackupService {
    controller: JobController,
    ingest: StatusIngest,
    store: Arc<dyn BaseJobStore>,
    sites: Arc<dyn BaseSiteStore>,
    slot: Arc<JobSlot>,
    settings: BackupSettings,
}

impl BackupService {
    pub fn new(deps: BackupDeps, settings: BackupSettings) -> Self {
        let slot = Arc::new(JobSlot::new());
        let pipeline = Arc::new(FinalizationPipeline::new(
            deps.store.clone(),
            deps.archiver,
            deps.signer,
            deps.notifier,
            deps.fingerprints,
            settings.clone(),
        ));

        Self {
            controller: JobController::new(
                deps.store.clone(),
                deps.sites.clone(),
                deps.launcher,
                settings.clone(),
                slot.clone(),
            ),
            ingest: StatusIngest::new(slot.clone(), pipeline),
            store: deps.store,
            sites: deps.sites,
            slot,
            settings,
        }
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }

    pub async fn start(&self, initiator: Option<&str>) -> Result<StartedJob, BackupError> {
        self.controller.start(initiator).await
    }

    pub async fn abandon(&self) -> Result<Option<BackupJobId>, BackupError> {
        self.controller.abandon().await
    }

    pub async fn ingest(&self, raw: &[u8]) -> Result<IngestOutcome, BackupError> {
        self.ingest.ingest(raw).await
    }

    /// Apply an already decoded message (socket transport).
    pub async fn apply(&self, message: Message) -> Result<IngestOutcome, BackupError> {
        self.ingest.apply(message).await
    }

    pub fn statuses(&self) -> Vec<WorkerSummary> {
        self.ingest.statuses()
    }

    pub fn active_job(&self) -> Option<BackupJobId> {
        self.slot.current().map(|job| job.job_id)
    }

    pub async fn list_jobs(&self) -> Result<Vec<BackupJob>, BackupError> {
        self.store.list().await.map_err(BackupError::Store)
    }

    pub async fn find_job(&self, id: BackupJobId) -> Result<Option<BackupJob>, BackupError> {
        self.store.find_by_id(id).await.map_err(BackupError::Store)
    }

    pub async fn latest_job(&self) -> Result<Option<BackupJob>, BackupError> {
        self.store.latest().await.map_err(BackupError::Store)
    }

    /// Location of a job's archive, if it has one.
    pub fn archive_path(&self, job: &BackupJob) -> Option<PathBuf> {
        let dir = self.settings.archive_path.as_ref()?;
        job.archive_file_name().map(|name| dir.join(name))
    }

    /// Location of a job's signature, if it was signed.
    pub fn signature_path(&self, job: &BackupJob) -> Option<PathBuf> {
        if !job.signature_present {
            return None;
        }
        self.archive_path(job).map(|archive| signature_path(&archive))
    }

    /// Delete a job record together with its archive and signature.
    ///
    /// Archives are named by content hash, so files still referenced by
    /// another record are kept.
    pub async fn delete_job(&self, id: BackupJobId) -> Result<bool, BackupError> {
        let Some(job) = self.find_job(id).await? else {
            return Ok(false);
        };

        if self.slot.release(id) {
            tracing::warn!(job_id = %id, "Deleting the running backup");
        }

        let deleted = self.store.delete(id).await.map_err(BackupError::Store)?;

        let sharing: Vec<BackupJob> = match &job.archive_hash {
            Some(hash) => self
                .list_jobs()
                .await?
                .into_iter()
                .filter(|other| other.archive_hash.as_deref() == Some(hash.as_str()))
                .collect(),
            None => Vec::new(),
        };
        let mut doomed = Vec::new();
        if sharing.is_empty() {
            doomed.extend(self.archive_path(&job));
        }
        if !sharing.iter().any(|other| other.signature_present) {
            doomed.extend(self.signature_path(&job));
        }
        if doomed.is_empty() && job.archive_hash.is_some() {
            tracing::info!(job_id = %id, shared_with = sharing.len(), "Archive kept for other backups");
        }

        for path in doomed {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove backup file");
            }
        }
        Ok(deleted)
    }

    pub async fn active_sites(&self) -> Result<Vec<Site>, BackupError> {
        self.sites.active_sites().await.map_err(BackupError::Store)
    }

    /// Replace the monitored site list. `None` deactivates every site.
    pub async fn replace_sites(&self, raw: Option<&str>) -> Result<Vec<Site>, BackupError> {
        let urls = raw.map(parse_site_list).unwrap_or_default();

        // Tags key the worker registry, so two sites may never share one
        let mut tags: HashMap<String, &str> = HashMap::with_capacity(urls.len());
        for url in &urls {
            let tag = site_tag(url).map_err(|e| BackupError::InvalidSite(e.to_string()))?;
            if let Some(first) = tags.insert(tag.clone(), url) {
                if first != url {
                    return Err(BackupError::InvalidSite(format!(
                        "{} and {} both map to worker tag {:?}",
                        first, url, tag
                    )));
                }
            }
        }
        let sites = self
            .sites
            .replace_active(&urls)
            .await
            .map_err(BackupError::Store)?;
        tracing::info!(count = sites.len(), "Monitored site list replaced");
        Ok(sites)
    }
}

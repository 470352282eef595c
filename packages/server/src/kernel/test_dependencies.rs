// TestDependencies - mock implementations for testing
//
// Provides mock services and in-memory stores that can be injected into
// BackupService for tests.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::signer::FingerprintCache;
use super::{
    ArchiveOutcome, ArchiveRequest, BaseArchiver, BaseJobStore, BaseLauncher, BaseNotifier,
    BaseSigner, BaseSiteStore,
};
use crate::common::{BackupJobId, SiteId};
use crate::config::BackupSettings;
use crate::domains::backup::models::{site_tag, BackupJob, Site};
use crate::domains::backup::{BackupDeps, BackupService};

// =============================================================================
// Mock Launcher
// =============================================================================

pub struct MockLauncher {
    configured: bool,
    requires_login: bool,
    fail_login: bool,
    fail_start: bool,
    fail_stop: bool,
    start_delay: Option<Duration>,
    login_calls: Arc<Mutex<usize>>,
    start_calls: Arc<Mutex<usize>>,
    stop_calls: Arc<Mutex<usize>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self {
            configured: true,
            requires_login: false,
            fail_login: false,
            fail_start: false,
            fail_stop: false,
            start_delay: None,
            login_calls: Arc::new(Mutex::new(0)),
            start_calls: Arc::new(Mutex::new(0)),
            stop_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Behave like the container launcher and require a login
    pub fn with_login(mut self) -> Self {
        self.requires_login = true;
        self
    }

    pub fn failing_login(mut self) -> Self {
        self.requires_login = true;
        self.fail_login = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Make `start` hang for `delay` before succeeding
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn login_calls(&self) -> usize {
        *self.login_calls.lock().unwrap()
    }

    pub fn start_calls(&self) -> usize {
        *self.start_calls.lock().unwrap()
    }

    pub fn stop_calls(&self) -> usize {
        *self.stop_calls.lock().unwrap()
    }
}

#[async_trait]
impl BaseLauncher for MockLauncher {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn requires_login(&self) -> bool {
        self.requires_login
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn login(&self) -> Result<()> {
        *self.login_calls.lock().unwrap() += 1;
        if self.fail_login {
            bail!("invalid credentials");
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        *self.start_calls.lock().unwrap() += 1;
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_start {
            bail!("container could not be started");
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        *self.stop_calls.lock().unwrap() += 1;
        if self.fail_stop {
            bail!("container could not be stopped");
        }
        Ok(())
    }
}

// =============================================================================
// Mock Archiver
// =============================================================================

/// Writes `content` to the requested destination instead of compressing
pub struct MockArchiver {
    content: Vec<u8>,
    snapshot_count: usize,
    fail: bool,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<ArchiveRequest>>>,
}

impl MockArchiver {
    pub fn new() -> Self {
        Self {
            content: b"mock archive".to_vec(),
            snapshot_count: 0,
            fail: false,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_content(mut self, content: &[u8]) -> Self {
        self.content = content.to_vec();
        self
    }

    pub fn with_snapshots(mut self, count: usize) -> Self {
        self.snapshot_count = count;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Take `delay` before writing, like compressing a large workspace
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<ArchiveRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl BaseArchiver for MockArchiver {
    async fn archive(&self, request: &ArchiveRequest) -> Result<ArchiveOutcome> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            bail!("disk full while compressing");
        }
        tokio::fs::write(&request.dest, &self.content).await?;
        Ok(ArchiveOutcome {
            path: request.dest.clone(),
            snapshot_count: self.snapshot_count,
        })
    }
}

// =============================================================================
// Mock Signer
// =============================================================================

pub struct MockSigner {
    fingerprint: String,
    fail: bool,
    signed: Arc<Mutex<Vec<PathBuf>>>,
    fingerprint_calls: Arc<Mutex<usize>>,
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            fingerprint: "0123456789ABCDEF0123456789ABCDEF01234567".to_string(),
            fail: false,
            signed: Arc::new(Mutex::new(Vec::new())),
            fingerprint_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: &str) -> Self {
        self.fingerprint = fingerprint.to_string();
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Files that were signed
    pub fn signed_files(&self) -> Vec<PathBuf> {
        self.signed.lock().unwrap().clone()
    }

    pub fn fingerprint_calls(&self) -> usize {
        *self.fingerprint_calls.lock().unwrap()
    }
}

#[async_trait]
impl BaseSigner for MockSigner {
    async fn sign_file(&self, file: &Path, signature: &Path) -> Result<()> {
        if self.fail {
            bail!("secret key not available");
        }
        self.signed.lock().unwrap().push(file.to_path_buf());
        tokio::fs::write(
            signature,
            "-----BEGIN PGP SIGNATURE-----\nmock\n-----END PGP SIGNATURE-----\n",
        )
        .await?;
        Ok(())
    }

    async fn fingerprint(&self) -> Result<String> {
        *self.fingerprint_calls.lock().unwrap() += 1;
        Ok(self.fingerprint.clone())
    }
}

// =============================================================================
// Mock Notifier
// =============================================================================

pub struct MockNotifier {
    fail: bool,
    sent: Arc<Mutex<Vec<String>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            fail: false,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// All messages that were sent (or attempted, when failing)
    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn was_sent_containing(&self, needle: &str) -> bool {
        self.sent.lock().unwrap().iter().any(|m| m.contains(needle))
    }
}

#[async_trait]
impl BaseNotifier for MockNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        if self.fail {
            bail!("webhook unreachable");
        }
        Ok(())
    }
}

// =============================================================================
// In-memory stores
// =============================================================================

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<Vec<BackupJob>>,
    fail_archive_hash: bool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, e.g. a finished job from an earlier run
    pub fn with_job(self, job: BackupJob) -> Self {
        self.jobs.lock().unwrap().push(job);
        self
    }

    /// Make `set_archive_hash` fail, like a lost database connection
    pub fn failing_archive_hash(mut self) -> Self {
        self.fail_archive_hash = true;
        self
    }

    pub fn jobs(&self) -> Vec<BackupJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseJobStore for InMemoryJobStore {
    async fn create(&self, initiator: Option<&str>, _sites: &[SiteId]) -> Result<BackupJob> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.iter().any(|j| !j.is_finished) {
            bail!("duplicate key value violates unique constraint \"backups_single_unfinished\"");
        }
        let job = BackupJob::started(initiator.map(str::to_string));
        jobs.push(job.clone());
        Ok(job)
    }

    async fn find_unfinished(&self) -> Result<Option<BackupJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| !j.is_finished)
            .cloned())
    }

    async fn find_by_id(&self, id: BackupJobId) -> Result<Option<BackupJob>> {
        Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
    }

    async fn latest(&self) -> Result<Option<BackupJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .max_by_key(|j| j.started_at)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<BackupJob>> {
        let mut jobs = self.jobs.lock().unwrap().clone();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(jobs)
    }

    async fn set_archive_hash(&self, id: BackupJobId, hash: &str) -> Result<()> {
        if self.fail_archive_hash {
            bail!("connection reset while storing archive hash");
        }
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| anyhow!("no job {}", id))?;
        job.archive_hash = Some(hash.to_string());
        Ok(())
    }

    async fn mark_finished(&self, id: BackupJobId, signature_present: bool) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| anyhow!("no job {}", id))?;
        job.is_finished = true;
        job.finished_at = Some(Utc::now());
        job.signature_present = signature_present;
        Ok(())
    }

    async fn delete(&self, id: BackupJobId) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        Ok(jobs.len() < before)
    }

    async fn abandon_unfinished(&self) -> Result<Option<BackupJobId>> {
        let mut jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter_mut().find(|j| !j.is_finished).map(|job| {
            job.is_finished = true;
            job.finished_at = Some(Utc::now());
            job.id
        }))
    }
}

#[derive(Default)]
pub struct InMemorySiteStore {
    sites: Mutex<Vec<Site>>,
}

impl InMemorySiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active sites named after the given tags (`https://<tag>.wikidot.com`)
    pub fn with_tags(tags: &[&str]) -> Self {
        let sites = tags
            .iter()
            .map(|tag| Site {
                id: SiteId::new(),
                url: format!("https://{}.wikidot.com", tag),
                name: tag.to_string(),
                is_active: true,
                created_at: Utc::now(),
            })
            .collect();
        Self {
            sites: Mutex::new(sites),
        }
    }
}

#[async_trait]
impl BaseSiteStore for InMemorySiteStore {
    async fn active_sites(&self) -> Result<Vec<Site>> {
        let mut active: Vec<Site> = self
            .sites
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(active)
    }

    async fn replace_active(&self, urls: &[String]) -> Result<Vec<Site>> {
        let mut sites = self.sites.lock().unwrap();
        for site in sites.iter_mut() {
            site.is_active = urls.contains(&site.url);
        }
        for url in urls {
            if !sites.iter().any(|s| &s.url == url) {
                sites.push(Site {
                    id: SiteId::new(),
                    url: url.clone(),
                    name: site_tag(url)?,
                    is_active: true,
                    created_at: Utc::now(),
                });
            }
        }
        Ok(sites.iter().filter(|s| s.is_active).cloned().collect())
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub job_store: Arc<InMemoryJobStore>,
    pub site_store: Arc<InMemorySiteStore>,
    pub launcher: Arc<MockLauncher>,
    pub archiver: Arc<MockArchiver>,
    pub signer: Arc<MockSigner>,
    pub notifier: Arc<MockNotifier>,
    pub fingerprints: Arc<FingerprintCache>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            job_store: Arc::new(InMemoryJobStore::new()),
            site_store: Arc::new(InMemorySiteStore::with_tags(&["alpha", "beta"])),
            launcher: Arc::new(MockLauncher::new()),
            archiver: Arc::new(MockArchiver::new()),
            signer: Arc::new(MockSigner::new()),
            notifier: Arc::new(MockNotifier::new()),
            fingerprints: Arc::new(FingerprintCache::new()),
        }
    }

    /// Set the monitored sites by tag
    pub fn with_sites(mut self, tags: &[&str]) -> Self {
        self.site_store = Arc::new(InMemorySiteStore::with_tags(tags));
        self
    }

    pub fn mock_job_store(mut self, store: InMemoryJobStore) -> Self {
        self.job_store = Arc::new(store);
        self
    }

    pub fn mock_launcher(mut self, launcher: MockLauncher) -> Self {
        self.launcher = Arc::new(launcher);
        self
    }

    pub fn mock_archiver(mut self, archiver: MockArchiver) -> Self {
        self.archiver = Arc::new(archiver);
        self
    }

    pub fn mock_signer(mut self, signer: MockSigner) -> Self {
        self.signer = Arc::new(signer);
        self
    }

    pub fn mock_notifier(mut self, notifier: MockNotifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn backup_deps(&self) -> BackupDeps {
        BackupDeps {
            store: self.job_store.clone(),
            sites: self.site_store.clone(),
            launcher: Some(self.launcher.clone()),
            archiver: self.archiver.clone(),
            signer: self.signer.clone(),
            notifier: self.notifier.clone(),
            fingerprints: self.fingerprints.clone(),
        }
    }

    /// Build a BackupService over these mocks. Mocks stay shared, so the
    /// test can inspect them afterwards.
    pub fn build_service(&self, settings: BackupSettings) -> Arc<BackupService> {
        Arc::new(BackupService::new(self.backup_deps(), settings))
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}

// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Orchestration (start preconditions, completion, finalization) lives in the
// backup domain and drives these traits.
//
// Naming convention: Base* for trait names (e.g., BaseLauncher, BaseSigner)

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{BackupJobId, SiteId};
use crate::domains::backup::models::{BackupJob, Site};

// =============================================================================
// Job Store Trait (Infrastructure - persistent backup records)
// =============================================================================

#[async_trait]
pub trait BaseJobStore: Send + Sync {
    /// Insert a new unfinished job linked to `sites`
    async fn create(&self, initiator: Option<&str>, sites: &[SiteId]) -> Result<BackupJob>;

    /// The single unfinished job, if any
    async fn find_unfinished(&self) -> Result<Option<BackupJob>>;

    async fn find_by_id(&self, id: BackupJobId) -> Result<Option<BackupJob>>;

    /// Most recently started job, finished or not
    async fn latest(&self) -> Result<Option<BackupJob>>;

    /// All jobs, newest first
    async fn list(&self) -> Result<Vec<BackupJob>>;

    async fn set_archive_hash(&self, id: BackupJobId, hash: &str) -> Result<()>;

    async fn mark_finished(&self, id: BackupJobId, signature_present: bool) -> Result<()>;

    /// Returns false if no such job existed
    async fn delete(&self, id: BackupJobId) -> Result<bool>;

    /// Mark the unfinished job finished without an archive, returning its id
    async fn abandon_unfinished(&self) -> Result<Option<BackupJobId>>;
}

// =============================================================================
// Site Store Trait (Infrastructure - list of monitored sites)
// =============================================================================

#[async_trait]
pub trait BaseSiteStore: Send + Sync {
    async fn active_sites(&self) -> Result<Vec<Site>>;

    /// Make `urls` the active set, deactivating everything else
    async fn replace_active(&self, urls: &[String]) -> Result<Vec<Site>>;
}

// =============================================================================
// Launcher Trait (Infrastructure - starts the crawler)
// =============================================================================

#[async_trait]
pub trait BaseLauncher: Send + Sync {
    /// Short name for logs ("container", "command")
    fn name(&self) -> &'static str;

    /// Whether `login` must succeed before `start`
    fn requires_login(&self) -> bool {
        false
    }

    /// Whether enough configuration is present to attempt a launch
    fn is_configured(&self) -> bool;

    async fn login(&self) -> Result<()> {
        Ok(())
    }

    /// Launch the crawler. Must return once the crawler is running; never
    /// waits for it to finish.
    async fn start(&self) -> Result<()>;

    /// Stop a running crawler. Launchers that cannot stop what they started
    /// do nothing.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Archiver Trait (Infrastructure - bundles worker output)
// =============================================================================

/// What to bundle and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    /// Shared crawler output, stored under `backup/` in the archive
    pub workspace: PathBuf,
    /// Per-page snapshots, stored under `snapshots/` when present
    pub snapshots: Option<PathBuf>,
    pub dest: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub path: PathBuf,
    /// Number of page snapshots included
    pub snapshot_count: usize,
}

#[async_trait]
pub trait BaseArchiver: Send + Sync {
    /// Bundle the request's sources into a single file at `request.dest`
    async fn archive(&self, request: &ArchiveRequest) -> Result<ArchiveOutcome>;
}

// =============================================================================
// Signer Trait (Infrastructure - detached signatures)
// =============================================================================

#[async_trait]
pub trait BaseSigner: Send + Sync {
    /// Write an ASCII-armored detached signature of `file` to `signature`
    async fn sign_file(&self, file: &Path, signature: &Path) -> Result<()>;

    /// Fingerprint of the signing key as raw hex
    async fn fingerprint(&self) -> Result<String>;
}

// =============================================================================
// Notifier Trait (Infrastructure - admin notifications)
// =============================================================================

#[async_trait]
pub trait BaseNotifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

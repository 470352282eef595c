//! Server dependencies (using traits for testability)
//!
//! This module wires the production implementations of every infrastructure
//! trait from `Config`. Tests build the same shape from `TestDependencies`.

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::{Config, LaunchMethod};
use crate::domains::backup::models::{PostgresJobStore, PostgresSiteStore};
use crate::domains::backup::{BackupDeps, BackupService};
use crate::kernel::{
    archiver::TarGzArchiver,
    launcher::{CommandLauncher, PortainerLauncher},
    notifier::WebhookNotifier,
    signer::{FingerprintCache, GpgSigner},
    BaseArchiver, BaseJobStore, BaseLauncher, BaseNotifier, BaseSigner, BaseSiteStore,
};

// =============================================================================
// ServerDeps
// =============================================================================

/// Production dependencies of the backup orchestrator
#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub job_store: Arc<dyn BaseJobStore>,
    pub site_store: Arc<dyn BaseSiteStore>,
    /// Launcher for the configured start method; `None` if unset or invalid
    pub launcher: Option<Arc<dyn BaseLauncher>>,
    pub archiver: Arc<dyn BaseArchiver>,
    pub signer: Arc<dyn BaseSigner>,
    pub notifier: Arc<dyn BaseNotifier>,
    /// Signing key fingerprint, loaded on first use
    pub fingerprints: Arc<FingerprintCache>,
}

impl ServerDeps {
    pub fn from_config(config: &Config, db_pool: PgPool) -> Result<Self> {
        let settings = config.backup_settings();

        let launcher: Option<Arc<dyn BaseLauncher>> = match settings.launch_method {
            Some(LaunchMethod::Container) => Some(Arc::new(PortainerLauncher::new(
                config.portainer_options(),
                settings.launch_timeout,
            ))),
            Some(LaunchMethod::Command) => {
                Some(Arc::new(CommandLauncher::new(config.backup_start_cmd.clone())))
            }
            None => {
                tracing::warn!(
                    method = ?config.backup_start_method,
                    "Backup start method not set or invalid, backups cannot be started"
                );
                None
            }
        };

        if config.signing_key_id.is_none() {
            tracing::warn!("SIGNING_KEY_ID not set, archives will not be signed");
        }

        Ok(Self {
            job_store: Arc::new(PostgresJobStore::new(db_pool.clone())),
            site_store: Arc::new(PostgresSiteStore::new(db_pool.clone())),
            launcher,
            archiver: Arc::new(TarGzArchiver::new()),
            signer: Arc::new(GpgSigner::new(
                config.gpg_binary.clone(),
                config.signing_key_id.clone(),
            )),
            notifier: Arc::new(WebhookNotifier::new(
                config.discord_webhook_url.clone(),
                config.disable_webhooks,
            )?),
            fingerprints: Arc::new(FingerprintCache::new()),
            db_pool,
        })
    }

    pub fn backup_deps(&self) -> BackupDeps {
        BackupDeps {
            store: self.job_store.clone(),
            sites: self.site_store.clone(),
            launcher: self.launcher.clone(),
            archiver: self.archiver.clone(),
            signer: self.signer.clone(),
            notifier: self.notifier.clone(),
            fingerprints: self.fingerprints.clone(),
        }
    }

    pub fn into_backup_service(self, config: &Config) -> Arc<BackupService> {
        Arc::new(BackupService::new(self.backup_deps(), config.backup_settings()))
    }
}

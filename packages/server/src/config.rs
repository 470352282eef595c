use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use typed_builder::TypedBuilder;

use portainer::PortainerOptions;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub backup_start_method: Option<String>,
    pub backup_start_cmd: Option<String>,
    pub backup_archive_path: Option<PathBuf>,
    pub backup_common_path: Option<PathBuf>,
    pub backup_snapshot_path: Option<PathBuf>,
    pub backup_interval_secs: Option<u64>,
    pub backup_launch_timeout_secs: u64,
    pub portainer_url: Option<String>,
    pub portainer_user: Option<String>,
    pub portainer_password: Option<String>,
    pub portainer_env_id: Option<u32>,
    pub portainer_container_name: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub disable_webhooks: bool,
    pub signing_key_id: Option<String>,
    pub gpg_binary: String,
    pub status_socket_addr: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            backup_start_method: optional("BACKUP_START_METHOD"),
            backup_start_cmd: optional("BACKUP_START_CMD"),
            backup_archive_path: optional("BACKUP_ARCHIVE_PATH").map(PathBuf::from),
            backup_common_path: optional("BACKUP_COMMON_PATH").map(PathBuf::from),
            backup_snapshot_path: optional("BACKUP_SNAPSHOT_PATH").map(PathBuf::from),
            backup_interval_secs: optional("BACKUP_INTERVAL_SECS")
                .map(|v| v.parse())
                .transpose()
                .context("BACKUP_INTERVAL_SECS must be a number of seconds")?,
            backup_launch_timeout_secs: env::var("BACKUP_LAUNCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("BACKUP_LAUNCH_TIMEOUT_SECS must be a number of seconds")?,
            portainer_url: optional("PORTAINER_URL"),
            portainer_user: optional("PORTAINER_USER"),
            portainer_password: optional("PORTAINER_PASSWORD"),
            portainer_env_id: optional("PORTAINER_ENV_ID")
                .map(|v| v.parse())
                .transpose()
                .context("PORTAINER_ENV_ID must be a number")?,
            portainer_container_name: optional("PORTAINER_CONTAINER_NAME"),
            discord_webhook_url: optional("DISCORD_WEBHOOK_URL"),
            disable_webhooks: env::var("DISABLE_WEBHOOKS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            signing_key_id: optional("SIGNING_KEY_ID"),
            gpg_binary: env::var("GPG_BINARY").unwrap_or_else(|_| "gpg".to_string()),
            status_socket_addr: optional("STATUS_SOCKET_ADDR"),
        })
    }

    /// Orchestrator-facing view of the backup settings.
    pub fn backup_settings(&self) -> BackupSettings {
        BackupSettings::builder()
            .launch_method(
                self.backup_start_method
                    .as_deref()
                    .and_then(LaunchMethod::parse),
            )
            .archive_path(self.backup_archive_path.clone())
            .common_path(self.backup_common_path.clone())
            .snapshot_path(self.backup_snapshot_path.clone())
            .launch_timeout(Duration::from_secs(self.backup_launch_timeout_secs))
            .interval(self.backup_interval_secs.map(Duration::from_secs))
            .build()
    }

    /// Portainer connection options, if every field is present.
    pub fn portainer_options(&self) -> Option<PortainerOptions> {
        Some(PortainerOptions {
            url: self.portainer_url.clone()?,
            user: self.portainer_user.clone()?,
            password: self.portainer_password.clone()?,
            env_id: self.portainer_env_id?,
            container_name: self.portainer_container_name.clone()?,
        })
    }
}

/// Empty values count as unset.
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// How the crawler fleet is launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMethod {
    /// Start a container through Portainer
    Container,
    /// Run a local shell command
    Command,
}

impl LaunchMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "container" => Some(LaunchMethod::Container),
            "command" => Some(LaunchMethod::Command),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct BackupSettings {
    /// `None` when unset or unrecognized
    #[builder(default)]
    pub launch_method: Option<LaunchMethod>,
    /// Directory finished archives are written to
    #[builder(default)]
    pub archive_path: Option<PathBuf>,
    /// Shared workspace the crawlers write into
    #[builder(default)]
    pub common_path: Option<PathBuf>,
    #[builder(default)]
    pub snapshot_path: Option<PathBuf>,
    #[builder(default = Duration::from_secs(30))]
    pub launch_timeout: Duration,
    /// Auto-backup interval; `None` disables the scheduler
    #[builder(default)]
    pub interval: Option<Duration>,
}

impl BackupSettings {
    pub fn paths_configured(&self) -> bool {
        self.archive_path.is_some() && self.common_path.is_some()
    }
}

//! Crawler launchers: a Portainer-managed container or a local command.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use portainer::{ActionOutcome, PortainerClient, PortainerOptions};
use tokio::process::Command;

use super::traits::BaseLauncher;

// =============================================================================
// Portainer
// =============================================================================

/// Starts the crawler container through Portainer.
pub struct PortainerLauncher {
    client: Option<PortainerClient>,
}

impl PortainerLauncher {
    /// A launcher with missing or invalid options is kept but reports itself
    /// as unconfigured, so the start path can say why it refuses.
    pub fn new(options: Option<PortainerOptions>, timeout: Duration) -> Self {
        let client = options.and_then(|options| {
            PortainerClient::with_timeout(options, timeout)
                .map_err(|e| tracing::warn!(error = %e, "Portainer client not initialised"))
                .ok()
        });
        Self { client }
    }

    fn client(&self) -> Result<&PortainerClient> {
        self.client
            .as_ref()
            .ok_or_else(|| anyhow!("Portainer connection is not configured"))
    }
}

#[async_trait]
impl BaseLauncher for PortainerLauncher {
    fn name(&self) -> &'static str {
        "container"
    }

    fn requires_login(&self) -> bool {
        true
    }

    fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    async fn login(&self) -> Result<()> {
        self.client()?.login().await?;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let client = self.client()?;
        tracing::info!(container = %client.container_name(), "Starting crawler container");
        match client.start_container().await? {
            ActionOutcome::Done => {}
            ActionOutcome::Unchanged => {
                tracing::warn!(container = %client.container_name(), "Crawler container was already running")
            }
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let client = self.client()?;
        if !client.is_logged_in() {
            client.login().await?;
        }
        tracing::info!(container = %client.container_name(), "Stopping crawler container");
        client.stop_container().await?;
        Ok(())
    }
}

// =============================================================================
// Local command
// =============================================================================

/// How long a freshly spawned command may take to fail before it counts as
/// running.
const SPAWN_GRACE: Duration = Duration::from_secs(2);

/// Runs a shell command that starts the crawler.
///
/// The command may either return quickly (a wrapper script) or keep running
/// as the crawler itself. Only a spawn failure or a non-zero exit within the
/// grace period is a launch failure.
pub struct CommandLauncher {
    command: Option<String>,
    grace: Duration,
}

impl CommandLauncher {
    pub fn new(command: Option<String>) -> Self {
        Self {
            command: command.filter(|c| !c.trim().is_empty()),
            grace: SPAWN_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

#[async_trait]
impl BaseLauncher for CommandLauncher {
    fn name(&self) -> &'static str {
        "command"
    }

    fn is_configured(&self) -> bool {
        self.command.is_some()
    }

    async fn start(&self) -> Result<()> {
        let command = self
            .command
            .as_deref()
            .ok_or_else(|| anyhow!("no start command configured"))?;

        tracing::info!(command = %command, "Running crawler start command");
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .spawn()
            .context("failed to spawn start command")?;

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => bail!("start command exited with {}", status),
            Ok(Err(e)) => Err(e).context("failed to wait for start command"),
            Err(_) => {
                // Still running: that is the crawler. Reap it in the background.
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) => tracing::info!(%status, "Crawler command exited"),
                        Err(e) => tracing::warn!(error = %e, "Lost track of crawler command"),
                    }
                });
                Ok(())
            }
        }
    }
}

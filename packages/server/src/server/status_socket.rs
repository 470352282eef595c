//! Push-socket transport for worker status messages.
//!
//! Workers that cannot make HTTP requests connect over TCP and write one
//! JSON message per line. Nothing is written back.
//!
//! ```text
//! connection task (per peer) ──decode──► bounded mpsc ──► consumer task
//!                                                         └─► BackupService::apply
//! ```
//!
//! Cancelling the shutdown token stops accepting, closes every connection
//! and lets the consumer drain what was already queued.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domains::backup::protocol::{self, Message};
use crate::domains::backup::{BackupService, IngestOutcome};

/// Configuration for the status socket.
#[derive(Debug, Clone)]
pub struct StatusSocketConfig {
    /// Connections silent for longer than this are closed.
    pub idle_timeout: Duration,
    /// Decoded messages waiting for the consumer before readers block.
    pub channel_capacity: usize,
    /// Longest accepted line in bytes. A peer exceeding it is disconnected.
    pub max_line_length: usize,
}

impl Default for StatusSocketConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            channel_capacity: 256,
            max_line_length: 1024 * 1024,
        }
    }
}

pub struct StatusSocket {
    listener: TcpListener,
    service: Arc<BackupService>,
    config: StatusSocketConfig,
}

impl StatusSocket {
    pub async fn bind(
        addr: &str,
        service: Arc<BackupService>,
        config: StatusSocketConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind status socket to {}", addr))?;
        Ok(Self {
            listener,
            service,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the listener in the background until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run(shutdown).await {
                error!(error = %e, "Status socket exited with error");
            }
        })
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let consumer = tokio::spawn(consume(self.service.clone(), rx));

        info!(addr = %self.local_addr()?, "Status socket listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "Status socket connection opened");
                        tokio::spawn(read_connection(
                            stream,
                            peer,
                            tx.clone(),
                            self.config.clone(),
                            shutdown.child_token(),
                        ));
                    }
                    Err(e) => warn!(error = %e, "Failed to accept status socket connection"),
                },
            }
        }

        // The consumer ends once every sender is gone
        drop(tx);
        consumer.await.context("Status consumer panicked")?;
        info!("Status socket stopped");
        Ok(())
    }
}

async fn read_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<Message>,
    config: StatusSocketConfig,
    shutdown: CancellationToken,
) {
    let idle_timeout = config.idle_timeout;
    let mut lines = FramedRead::new(stream, LinesCodec::new_with_max_length(config.max_line_length));

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = tokio::time::timeout(idle_timeout, lines.next()) => line,
        };

        let line = match line {
            Ok(Some(Ok(line))) => line,
            Ok(None) => break,
            Ok(Some(Err(LinesCodecError::MaxLineLengthExceeded))) => {
                warn!(peer = %peer, max = config.max_line_length, "Status line too long, closing connection");
                break;
            }
            Ok(Some(Err(LinesCodecError::Io(e)))) => {
                warn!(peer = %peer, error = %e, "Status socket read failed");
                break;
            }
            Err(_) => {
                debug!(peer = %peer, timeout_secs = idle_timeout.as_secs(), "Closing idle status connection");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match protocol::decode(line.as_bytes()) {
            Ok(message) => {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(peer = %peer, error = %e, "Rejected status message"),
        }
    }

    debug!(peer = %peer, "Status socket connection closed");
}

async fn consume(service: Arc<BackupService>, mut rx: mpsc::Receiver<Message>) {
    while let Some(message) = rx.recv().await {
        let tag = message.tag.clone();
        match service.apply(message).await {
            Ok(IngestOutcome::Finalized(summary)) => {
                info!(job_id = %summary.job_id, "Backup finalized from status socket");
            }
            Ok(IngestOutcome::FinalizationFailed(e)) => {
                error!(error = %e, "Backup finalization failed");
            }
            Ok(IngestOutcome::Applied(_)) => {}
            Err(e) => warn!(tag = %tag, error = %e, "Status message not applied"),
        }
    }
}

use thiserror::Error;

use super::protocol::{CodecError, MessageType};
use crate::common::BackupJobId;

/// Failures of the backup orchestrator.
///
/// Per-message errors (`Codec`, `UnknownWorker`, `UnhandledMessage`) only
/// ever reject the one message. Start-path errors leave no job behind.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("message addressed to unknown worker {tag:?}")]
    UnknownWorker { tag: String },

    #[error("unknown or unused message type {0:?}")]
    UnhandledMessage(MessageType),

    #[error("a backup is already running ({0})")]
    JobAlreadyRunning(BackupJobId),

    #[error("backup start method not set or invalid")]
    LaunchMethodInvalid,

    #[error("backup common or archive path missing from config")]
    PathsMissing,

    #[error("launcher is not configured: {0}")]
    LauncherNotConfigured(String),

    #[error("launcher login failed: {0}")]
    LauncherLogin(String),

    #[error("launcher failed to start the crawler: {0}")]
    LauncherStart(String),

    #[error("invalid site url: {0}")]
    InvalidSite(String),

    #[error("no sites are marked for backup")]
    NoActiveSites,

    #[error("archiving failed: {0}")]
    Archive(String),

    #[error("finalization task aborted: {0}")]
    FinalizationAborted(String),

    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    #[error("job store error: {0}")]
    Store(anyhow::Error),
}

impl BackupError {
    /// Whether the error is caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BackupError::Codec(_)
                | BackupError::UnknownWorker { .. }
                | BackupError::UnhandledMessage(_)
                | BackupError::InvalidSite(_)
        )
    }
}

//! Detached archive signatures through the `gpg` binary.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::RwLock;

use super::traits::BaseSigner;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("no signing key configured")]
    NoKey,

    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gpg exited with {status}: {stderr}")]
    Gpg { status: String, stderr: String },

    #[error("gpg did not report a fingerprint for key {0}")]
    NoFingerprint(String),
}

/// Signs with a key from the local gpg keyring.
pub struct GpgSigner {
    binary: PathBuf,
    key_id: Option<String>,
}

impl GpgSigner {
    pub fn new(binary: impl Into<PathBuf>, key_id: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            key_id,
        }
    }

    fn key(&self) -> Result<&str, SignError> {
        self.key_id.as_deref().ok_or(SignError::NoKey)
    }

    async fn run<I, S>(&self, args: I) -> Result<Vec<u8>, SignError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|source| SignError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(SignError::Gpg {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl BaseSigner for GpgSigner {
    async fn sign_file(&self, file: &Path, signature: &Path) -> Result<()> {
        let key = self.key()?;
        self.run([
            OsStr::new("--batch"),
            OsStr::new("--yes"),
            OsStr::new("--detach-sign"),
            OsStr::new("--armor"),
            OsStr::new("--local-user"),
            OsStr::new(key),
            OsStr::new("--output"),
            signature.as_os_str(),
            file.as_os_str(),
        ])
        .await?;

        tracing::info!(file = %file.display(), key = %key, "Archive signed");
        Ok(())
    }

    async fn fingerprint(&self) -> Result<String> {
        let key = self.key()?;
        let stdout = self
            .run(["--batch", "--with-colons", "--fingerprint", key])
            .await?;

        parse_colon_fingerprint(&String::from_utf8_lossy(&stdout))
            .ok_or_else(|| SignError::NoFingerprint(key.to_string()).into())
    }
}

/// First `fpr` record of `gpg --with-colons` output.
fn parse_colon_fingerprint(listing: &str) -> Option<String> {
    listing
        .lines()
        .find(|line| line.starts_with("fpr:"))
        .and_then(|line| line.split(':').nth(9))
        .filter(|fpr| !fpr.is_empty())
        .map(str::to_string)
}

/// Render a fingerprint in space-separated groups of four.
pub fn group_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Process-wide cache of the signing key fingerprint.
///
/// Built once at startup and shared. `load` asks the signer on first use;
/// `invalidate` forces the next `load` to ask again (e.g. after a key swap).
#[derive(Debug, Default)]
pub struct FingerprintCache {
    value: RwLock<Option<String>>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached fingerprint, fetching it from `signer` if needed. Lookup
    /// failures are logged and not cached.
    pub async fn load(&self, signer: &dyn BaseSigner) -> Option<String> {
        if let Some(cached) = self.value.read().await.clone() {
            return Some(cached);
        }

        let mut slot = self.value.write().await;
        if let Some(cached) = slot.clone() {
            return Some(cached);
        }
        match signer.fingerprint().await {
            Ok(fingerprint) => {
                *slot = Some(fingerprint.clone());
                Some(fingerprint)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read signing key fingerprint");
                None
            }
        }
    }

    pub async fn invalidate(&self) {
        *self.value.write().await = None;
    }
}

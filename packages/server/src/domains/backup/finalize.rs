//! Finalization: archive, hash, sign, report, notify, persist, clear.
//!
//! Runs once per completed job, on the context that won the completion
//! claim. Only archiving and recording the archive hash can abort the run;
//! signing and notifying degrade gracefully.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use sha2::{Digest, Sha256};

use super::completion::ActiveJob;
use super::error::BackupError;
use super::models::backup_job::{archive_file_name, SIGNATURE_SUFFIX};
use super::models::WorkerSummary;
use crate::common::BackupJobId;
use crate::config::BackupSettings;
use crate::kernel::signer::{group_fingerprint, FingerprintCache};
use crate::kernel::{ArchiveRequest, BaseArchiver, BaseJobStore, BaseNotifier, BaseSigner};

/// Name of the archive while it is being written, before it is hash-addressed.
const WORKING_ARCHIVE: &str = "current.tar.gz";
const WORKING_SIGNATURE: &str = "current.tar.gz.asc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizationSummary {
    pub job_id: BackupJobId,
    pub archive_hash: String,
    pub archive_path: PathBuf,
    pub signed: bool,
    pub notified: bool,
    pub report: String,
}

pub struct FinalizationPipeline {
    store: Arc<dyn BaseJobStore>,
    archiver: Arc<dyn BaseArchiver>,
    signer: Arc<dyn BaseSigner>,
    notifier: Arc<dyn BaseNotifier>,
    fingerprints: Arc<FingerprintCache>,
    settings: BackupSettings,
}

impl FinalizationPipeline {
    pub fn new(
        store: Arc<dyn BaseJobStore>,
        archiver: Arc<dyn BaseArchiver>,
        signer: Arc<dyn BaseSigner>,
        notifier: Arc<dyn BaseNotifier>,
        fingerprints: Arc<FingerprintCache>,
        settings: BackupSettings,
    ) -> Self {
        Self {
            store,
            archiver,
            signer,
            notifier,
            fingerprints,
            settings,
        }
    }

    pub async fn run(&self, job: &ActiveJob) -> Result<FinalizationSummary, BackupError> {
        tracing::info!(job_id = %job.job_id, "Finalizing backup");

        // 1. The job we are finishing must still be the unfinished one
        let record = self
            .store
            .find_unfinished()
            .await
            .map_err(BackupError::Store)?;
        match record {
            Some(record) if record.id == job.job_id => {}
            other => {
                let reason = match other {
                    Some(record) => format!(
                        "job {} completed but job {} is the unfinished one",
                        job.job_id, record.id
                    ),
                    None => format!("job {} completed but no unfinished job exists", job.job_id),
                };
                tracing::error!(job_id = %job.job_id, reason = %reason, "Inconsistent backup state");
                self.notify(&format!("Backup finalization aborted: {}", reason))
                    .await;
                job.registry().clear();
                return Err(BackupError::InconsistentState(reason));
            }
        }

        // 2. Archive
        let archive = match self.archive().await {
            Ok(archive) => archive,
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "Failed to archive backup");
                self.notify(&format!(
                    "Backup archiving failed, the job is left unfinished: {}",
                    e
                ))
                .await;
                job.registry().clear();
                return Err(BackupError::Archive(e.to_string()));
            }
        };

        // 3. Hash and rename
        tracing::info!(job_id = %job.job_id, hash = %archive.hash, "Archive hashed");
        if let Err(e) = self.store.set_archive_hash(job.job_id, &archive.hash).await {
            tracing::error!(job_id = %job.job_id, error = %e, "Failed to store archive hash");
            self.notify(&format!(
                "Backup archive {} could not be recorded, the job is left unfinished: {}",
                archive.hash, e
            ))
            .await;
            job.registry().clear();
            return Err(BackupError::Store(e));
        }

        // 4. Sign
        let signed = self.sign(&archive.path).await;
        let fingerprint = if signed {
            self.fingerprints.load(self.signer.as_ref()).await
        } else {
            None
        };

        // 5. Report
        let workers = job.registry().all();
        let report = compose_report(&ReportInput {
            finished_at: Utc::now(),
            workers: &workers,
            snapshot_count: archive.snapshot_count,
            signed,
            fingerprint: fingerprint.as_deref(),
            archive_hash: &archive.hash,
        });

        // 6. Notify
        let notified = self.notify(&report).await;

        // 7. Persist and clear
        let persisted = self.store.mark_finished(job.job_id, signed).await;
        job.registry().clear();
        persisted.map_err(BackupError::Store)?;

        tracing::info!(job_id = %job.job_id, signed, notified, "Backup finished");
        Ok(FinalizationSummary {
            job_id: job.job_id,
            archive_hash: archive.hash,
            archive_path: archive.path,
            signed,
            notified,
            report,
        })
    }

    async fn archive(&self) -> anyhow::Result<HashedArchive> {
        let (archive_dir, workspace) = match (&self.settings.archive_path, &self.settings.common_path) {
            (Some(archive), Some(common)) => (archive.clone(), common.clone()),
            _ => anyhow::bail!("archive or workspace path is not configured"),
        };

        let outcome = self
            .archiver
            .archive(&ArchiveRequest {
                workspace,
                snapshots: self.settings.snapshot_path.clone(),
                dest: archive_dir.join(WORKING_ARCHIVE),
            })
            .await?;

        let hash = hash_file(outcome.path.clone()).await?;
        let path = archive_dir.join(archive_file_name(&hash));
        tokio::fs::rename(&outcome.path, &path).await?;

        Ok(HashedArchive {
            path,
            hash,
            snapshot_count: outcome.snapshot_count,
        })
    }

    /// Returns whether a signature file now sits next to the archive.
    ///
    /// The signature is written under a working name and moved into place
    /// only on success, so a failed run never touches the signature of an
    /// earlier job with identical archive bytes.
    async fn sign(&self, archive: &Path) -> bool {
        let signature = signature_path(archive);
        let working = archive_dir_of(archive).join(WORKING_SIGNATURE);
        let signed = match self.signer.sign_file(archive, &working).await {
            Ok(()) => tokio::fs::rename(&working, &signature)
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        match signed {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(archive = %archive.display(), error = %e, "Signing backup failed");
                // gpg may leave a partial file behind
                let _ = tokio::fs::remove_file(&working).await;
                false
            }
        }
    }

    async fn notify(&self, text: &str) -> bool {
        match self.notifier.send(text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send backup notification");
                false
            }
        }
    }
}

struct HashedArchive {
    path: PathBuf,
    hash: String,
    snapshot_count: usize,
}

/// Detached signature path for an archive.
pub fn signature_path(archive: &Path) -> PathBuf {
    let mut path = archive.as_os_str().to_owned();
    path.push(SIGNATURE_SUFFIX);
    PathBuf::from(path)
}

fn archive_dir_of(archive: &Path) -> &Path {
    archive.parent().unwrap_or_else(|| Path::new("."))
}

/// Hex SHA-256 of a file, streamed.
pub async fn hash_file(path: PathBuf) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok::<_, anyhow::Error>(hex::encode(hasher.finalize()))
    })
    .await?
}

pub struct ReportInput<'a> {
    pub finished_at: DateTime<Utc>,
    pub workers: &'a [WorkerSummary],
    pub snapshot_count: usize,
    pub signed: bool,
    pub fingerprint: Option<&'a str>,
    pub archive_hash: &'a str,
}

/// Plain-text completion report sent to the admins.
pub fn compose_report(input: &ReportInput<'_>) -> String {
    let mut report = format!(
        "Backup finished at {}:\n\n",
        input
            .finished_at
            .with_timezone(&Local)
            .format("%H:%M:%S %d-%m-%y")
    );

    for worker in input.workers {
        let total = worker
            .total_items
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".to_string());
        report.push_str(&format!(
            "{}\nBacked up {} of {} pages\nRecorded {} errors\n\n",
            worker.tag, worker.finished_items, total, worker.error_count
        ));
    }

    if input.snapshot_count > 0 {
        report.push_str(&format!(
            "Included {} page snapshots\n\n",
            input.snapshot_count
        ));
    }

    match (input.signed, input.fingerprint) {
        (true, Some(fingerprint)) => report.push_str(&format!(
            "The archive is signed with key {}, verify the signature before restoring!\n\n",
            group_fingerprint(fingerprint)
        )),
        (true, None) => report.push_str(
            "The archive is signed, but the key fingerprint is unavailable. Verify the signature before restoring!\n\n",
        ),
        (false, _) => report.push_str("WARNING: the archive is NOT SIGNED!\n\n"),
    }

    report.push_str(&format!(
        "Archive checksum (SHA-256): {}\n",
        input.archive_hash
    ));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::backup::protocol::WorkerStatus;

    fn summary(tag: &str, done: u64, total: Option<u64>, errors: u64) -> WorkerSummary {
        WorkerSummary {
            tag: tag.into(),
            status: WorkerStatus::Done,
            total_items: total,
            finished_items: done,
            postponed_items: 0,
            error_count: errors,
            log_len: 3,
        }
    }

    #[test]
    fn test_report_lists_workers_and_fingerprint() {
        let workers = vec![summary("alpha", 5, Some(10), 0), summary("beta", 7, None, 2)];
        let report = compose_report(&ReportInput {
            finished_at: Utc::now(),
            workers: &workers,
            snapshot_count: 4,
            signed: true,
            fingerprint: Some("AAAABBBBCCCC"),
            archive_hash: "deadbeef",
        });

        assert!(report.contains("alpha\nBacked up 5 of 10 pages\nRecorded 0 errors"));
        assert!(report.contains("beta\nBacked up 7 of ? pages\nRecorded 2 errors"));
        assert!(report.contains("Included 4 page snapshots"));
        assert!(report.contains("AAAA BBBB CCCC"));
        assert!(report.ends_with("Archive checksum (SHA-256): deadbeef\n"));
        assert!(!report.contains("NOT SIGNED"));
    }

    #[test]
    fn test_unsigned_report_warns() {
        let report = compose_report(&ReportInput {
            finished_at: Utc::now(),
            workers: &[],
            snapshot_count: 0,
            signed: false,
            fingerprint: None,
            archive_hash: "deadbeef",
        });

        assert!(report.contains("NOT SIGNED"));
        assert!(!report.contains("snapshots"));
    }

    #[test]
    fn test_signature_path_appends_suffix() {
        assert_eq!(
            signature_path(Path::new("/srv/archive/abc.tar.gz")),
            PathBuf::from("/srv/archive/abc.tar.gz.asc")
        );
    }

    #[tokio::test]
    async fn test_hash_file_is_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(
            hash_file(path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

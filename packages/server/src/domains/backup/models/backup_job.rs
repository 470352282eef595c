use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::{BackupJobId, SiteId};
use crate::kernel::BaseJobStore;

/// File extension of finished archives.
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Suffix appended to the archive name for its detached signature.
pub const SIGNATURE_SUFFIX: &str = ".asc";

/// One end-to-end backup run.
///
/// At most one record has `is_finished = false` at any time; the database
/// enforces this with a partial unique index.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BackupJob {
    pub id: BackupJobId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub archive_hash: Option<String>,
    pub signature_present: bool,
    pub is_finished: bool,
    pub initiator: Option<String>,
}

impl BackupJob {
    /// Fresh unfinished record, as created when a job starts.
    pub fn started(initiator: Option<String>) -> Self {
        Self {
            id: BackupJobId::new(),
            started_at: Utc::now(),
            finished_at: None,
            archive_hash: None,
            signature_present: false,
            is_finished: false,
            initiator,
        }
    }

    /// Hash-addressed archive file name, once the archive exists.
    pub fn archive_file_name(&self) -> Option<String> {
        self.archive_hash
            .as_ref()
            .map(|hash| archive_file_name(hash))
    }

    pub fn signature_file_name(&self) -> Option<String> {
        self.archive_file_name()
            .map(|name| format!("{}{}", name, SIGNATURE_SUFFIX))
    }

    /// File name offered to people downloading the archive.
    pub fn download_name(&self) -> String {
        format!(
            "{}.{}",
            self.started_at.format("backup-%d-%m-%y"),
            ARCHIVE_EXTENSION
        )
    }
}

pub fn archive_file_name(hash: &str) -> String {
    format!("{}.{}", hash, ARCHIVE_EXTENSION)
}

// =============================================================================
// Queries
// =============================================================================

impl BackupJob {
    pub async fn create(
        initiator: Option<&str>,
        sites: &[SiteId],
        pool: &PgPool,
    ) -> Result<Self> {
        let mut tx = pool.begin().await?;

        let job = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO backups (id, started_at, is_finished, initiator)
            VALUES ($1, NOW(), FALSE, $2)
            RETURNING *
            "#,
        )
        .bind(BackupJobId::new())
        .bind(initiator)
        .fetch_one(&mut *tx)
        .await?;

        let site_ids: Vec<Uuid> = sites.iter().map(|id| id.into_uuid()).collect();
        sqlx::query(
            "INSERT INTO backup_sites (backup_id, site_id) SELECT $1, UNNEST($2::uuid[])",
        )
        .bind(job.id)
        .bind(&site_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }

    pub async fn find_unfinished(pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM backups WHERE is_finished = FALSE LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_id(id: BackupJobId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM backups WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// All jobs, newest first.
    pub async fn find_all(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM backups ORDER BY started_at DESC")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_latest(pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM backups ORDER BY started_at DESC LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn set_archive_hash(id: BackupJobId, hash: &str, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE backups SET archive_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn mark_finished(
        id: BackupJobId,
        signature_present: bool,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE backups
            SET is_finished = TRUE,
                finished_at = NOW(),
                signature_present = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(signature_present)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(id: BackupJobId, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query("DELETE FROM backups WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Close the in-flight job without an archive (operator intervention).
    pub async fn abandon_unfinished(pool: &PgPool) -> Result<Option<BackupJobId>> {
        sqlx::query_scalar::<_, BackupJobId>(
            r#"
            UPDATE backups
            SET is_finished = TRUE,
                finished_at = NOW()
            WHERE is_finished = FALSE
            RETURNING id
            "#,
        )
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }
}

// =============================================================================
// Store adapter
// =============================================================================

/// Postgres-backed job store.
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseJobStore for PostgresJobStore {
    async fn create(&self, initiator: Option<&str>, sites: &[SiteId]) -> Result<BackupJob> {
        BackupJob::create(initiator, sites, &self.pool).await
    }

    async fn find_unfinished(&self) -> Result<Option<BackupJob>> {
        BackupJob::find_unfinished(&self.pool).await
    }

    async fn find_by_id(&self, id: BackupJobId) -> Result<Option<BackupJob>> {
        BackupJob::find_by_id(id, &self.pool).await
    }

    async fn latest(&self) -> Result<Option<BackupJob>> {
        BackupJob::find_latest(&self.pool).await
    }

    async fn list(&self) -> Result<Vec<BackupJob>> {
        BackupJob::find_all(&self.pool).await
    }

    async fn set_archive_hash(&self, id: BackupJobId, hash: &str) -> Result<()> {
        BackupJob::set_archive_hash(id, hash, &self.pool).await
    }

    async fn mark_finished(&self, id: BackupJobId, signature_present: bool) -> Result<()> {
        BackupJob::mark_finished(id, signature_present, &self.pool).await
    }

    async fn delete(&self, id: BackupJobId) -> Result<bool> {
        BackupJob::delete(id, &self.pool).await
    }

    async fn abandon_unfinished(&self) -> Result<Option<BackupJobId>> {
        BackupJob::abandon_unfinished(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_names_follow_hash() {
        let mut job = BackupJob::started(None);
        assert!(job.archive_file_name().is_none());
        assert!(job.signature_file_name().is_none());

        job.archive_hash = Some("abc123".into());
        assert_eq!(job.archive_file_name().as_deref(), Some("abc123.tar.gz"));
        assert_eq!(job.signature_file_name().as_deref(), Some("abc123.tar.gz.asc"));
    }

    #[test]
    fn test_download_name_uses_start_date() {
        let mut job = BackupJob::started(Some("admin".into()));
        job.started_at = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(job.download_name(), "backup-07-03-26.tar.gz");
    }
}

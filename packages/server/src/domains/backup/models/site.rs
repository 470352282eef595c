use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use url::Url;

use crate::common::SiteId;
use crate::kernel::BaseSiteStore;

/// A monitored site. Its `name` is the worker tag used by the status protocol.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Site {
    pub id: SiteId,
    pub url: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Derive the worker tag for a site URL: the first label of its host.
///
/// `https://scp-cs.wikidot.com/` becomes `scp-cs`.
pub fn site_tag(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| anyhow!("invalid site url {}: {}", url, e))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("site url {} has no host", url))?;
    host.split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("site url {} has an empty host", url))
}

/// Split a newline-separated URL list, dropping blank lines.
pub fn parse_site_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

impl Site {
    pub async fn find_active(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM sites WHERE is_active = TRUE ORDER BY name")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    /// Make `urls` the active site list.
    ///
    /// Listed sites are inserted or reactivated; every other site is marked
    /// inactive. Rows are never deleted since past jobs reference them.
    pub async fn replace_active(urls: &[String], pool: &PgPool) -> Result<Vec<Self>> {
        let mut named = Vec::with_capacity(urls.len());
        for url in urls {
            named.push((url.clone(), site_tag(url)?));
        }

        let mut tx = pool.begin().await?;
        for (url, name) in &named {
            sqlx::query(
                r#"
                INSERT INTO sites (id, url, name, is_active)
                VALUES ($1, $2, $3, TRUE)
                ON CONFLICT (url) DO UPDATE SET is_active = TRUE, name = EXCLUDED.name
                "#,
            )
            .bind(SiteId::new())
            .bind(url)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE sites SET is_active = FALSE WHERE NOT (url = ANY($1))")
            .bind(urls)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Self::find_active(pool).await
    }
}

/// Postgres-backed site directory.
pub struct PostgresSiteStore {
    pool: PgPool,
}

impl PostgresSiteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseSiteStore for PostgresSiteStore {
    async fn active_sites(&self) -> Result<Vec<Site>> {
        Site::find_active(&self.pool).await
    }

    async fn replace_active(&self, urls: &[String]) -> Result<Vec<Site>> {
        Site::replace_active(urls, &self.pool).await
    }
}

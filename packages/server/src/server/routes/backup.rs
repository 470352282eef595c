//! Backup HTTP endpoints.
//!
//! POST /backup/status          worker status message (JSON, possibly string-wrapped)
//! GET  /backup/status          current worker summaries
//! GET  /backup/start           start a job (`?initiator=`)
//! POST /backup/abandon         give up on the unfinished job
//! PUT  /backup/sites           replace the monitored site list
//! GET  /backups                job history, newest first
//! GET  /backup/:id/download    archive download
//! GET  /backup/:id/download_signature
//! DELETE /backup/:id

use std::path::PathBuf;

use axum::{
    body::{Body, Bytes},
    extract::{Extension, Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::common::BackupJobId;
use crate::domains::backup::models::{BackupJob, Site, WorkerSummary, SIGNATURE_SUFFIX};
use crate::domains::backup::{BackupError, StartedJob};
use crate::server::app::AxumAppState;

type RouteError = (StatusCode, String);

/// Map orchestrator errors onto HTTP status codes.
fn error_response(error: BackupError) -> RouteError {
    let status = match &error {
        BackupError::JobAlreadyRunning(_) => StatusCode::CONFLICT,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %error, "Backup request failed");
    }
    (status, error.to_string())
}

fn parse_job_id(raw: &str) -> Result<BackupJobId, RouteError> {
    BackupJobId::parse(raw).map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid job id {raw:?}")))
}

fn not_found(what: &str) -> RouteError {
    (StatusCode::NOT_FOUND, format!("{what} not found"))
}

// =============================================================================
// Status protocol
// =============================================================================

pub async fn status_post_handler(
    Extension(state): Extension<AxumAppState>,
    body: Bytes,
) -> Result<&'static str, RouteError> {
    state.backup.ingest(&body).await.map_err(error_response)?;
    Ok("OK")
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub job_id: Option<BackupJobId>,
    pub workers: Vec<WorkerSummary>,
}

pub async fn status_get_handler(Extension(state): Extension<AxumAppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        job_id: state.backup.active_job(),
        workers: state.backup.statuses(),
    })
}

// =============================================================================
// Job lifecycle
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    pub initiator: Option<String>,
}

pub async fn start_handler(
    Extension(state): Extension<AxumAppState>,
    Query(query): Query<StartQuery>,
) -> Result<String, RouteError> {
    let initiator = query.initiator.as_deref().filter(|s| !s.trim().is_empty());
    let started = state.backup.start(initiator).await.map_err(error_response)?;
    Ok(confirmation(&started))
}

fn confirmation(started: &StartedJob) -> String {
    format!(
        "Backup {} started for {} sites: {}",
        started.job_id,
        started.workers.len(),
        started.workers.join(", ")
    )
}

#[derive(Debug, Serialize)]
pub struct AbandonResponse {
    pub abandoned: Option<BackupJobId>,
}

pub async fn abandon_handler(
    Extension(state): Extension<AxumAppState>,
) -> Result<Json<AbandonResponse>, RouteError> {
    let abandoned = state.backup.abandon().await.map_err(error_response)?;
    Ok(Json(AbandonResponse { abandoned }))
}

#[derive(Debug, Deserialize)]
pub struct SitesRequest {
    /// Newline-separated site URLs. Missing deactivates every site.
    pub wikis: Option<String>,
}

pub async fn replace_sites_handler(
    Extension(state): Extension<AxumAppState>,
    Json(request): Json<SitesRequest>,
) -> Result<Json<Vec<Site>>, RouteError> {
    let sites = state
        .backup
        .replace_sites(request.wikis.as_deref())
        .await
        .map_err(error_response)?;
    Ok(Json(sites))
}

// =============================================================================
// Archives
// =============================================================================

pub async fn list_backups_handler(
    Extension(state): Extension<AxumAppState>,
) -> Result<Json<Vec<BackupJob>>, RouteError> {
    let jobs = state.backup.list_jobs().await.map_err(error_response)?;
    Ok(Json(jobs))
}

pub async fn delete_backup_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, RouteError> {
    let id = parse_job_id(&id)?;
    if state.backup.delete_job(id).await.map_err(error_response)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("backup"))
    }
}

pub async fn download_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<String>,
) -> Result<Response, RouteError> {
    let job = find_job(&state, &id).await?;
    let path = state.backup.archive_path(&job).ok_or_else(|| not_found("archive"))?;
    stream_file(path, "application/gzip", job.download_name()).await
}

pub async fn download_signature_handler(
    Extension(state): Extension<AxumAppState>,
    Path(id): Path<String>,
) -> Result<Response, RouteError> {
    let job = find_job(&state, &id).await?;
    let path = state
        .backup
        .signature_path(&job)
        .ok_or_else(|| not_found("signature"))?;
    let name = format!("{}{}", job.download_name(), SIGNATURE_SUFFIX);
    stream_file(path, "application/pgp-signature", name).await
}

async fn find_job(state: &AxumAppState, raw_id: &str) -> Result<BackupJob, RouteError> {
    let id = parse_job_id(raw_id)?;
    state
        .backup
        .find_job(id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| not_found("backup"))
}

async fn stream_file(
    path: PathBuf,
    content_type: &'static str,
    download_name: String,
) -> Result<Response, RouteError> {
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Backup file missing on disk");
            return Err(not_found("file"));
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to open backup file");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download_name),
            ),
        ],
        body,
    )
        .into_response())
}

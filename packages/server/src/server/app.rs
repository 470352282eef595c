//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domains::backup::BackupService;
use crate::server::routes::{
    abandon_handler, delete_backup_handler, download_handler, download_signature_handler,
    health_handler, list_backups_handler, replace_sites_handler, start_handler,
    status_get_handler, status_post_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AxumAppState {
    pub db_pool: PgPool,
    pub backup: Arc<BackupService>,
}

/// Build the Axum router with every backup endpoint.
pub fn build_app(state: AxumAppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        // Worker status protocol
        .route(
            "/backup/status",
            post(status_post_handler).get(status_get_handler),
        )
        // Job lifecycle
        .route("/backup/start", get(start_handler))
        .route("/backup/abandon", post(abandon_handler))
        .route("/backup/sites", put(replace_sites_handler))
        // Archives
        .route("/backups", get(list_backups_handler))
        .route("/backup/:id", delete(delete_backup_handler))
        .route("/backup/:id/download", get(download_handler))
        .route(
            "/backup/:id/download_signature",
            get(download_signature_handler),
        )
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

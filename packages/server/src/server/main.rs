// Main entry point for the backup server

use anyhow::{Context, Result};
use backup_core::kernel::{scheduled_tasks, ServerDeps};
use backup_core::server::{build_app, AxumAppState, StatusSocket, StatusSocketConfig};
use backup_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,backup_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting backup server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let backup = ServerDeps::from_config(&config, pool.clone())?.into_backup_service(&config);

    // A job left unfinished by a previous process has no live registry
    if let Some(job) = backup.latest_job().await?.filter(|job| !job.is_finished) {
        tracing::warn!(
            job_id = %job.id,
            "Found an unfinished backup from a previous run; abandon it before starting a new one"
        );
    }

    // Background tasks
    let _scheduler = match backup.settings().interval {
        Some(interval) => Some(
            scheduled_tasks::start_scheduler(backup.clone(), interval)
                .await
                .context("Failed to start scheduler")?,
        ),
        None => {
            tracing::info!("BACKUP_INTERVAL_SECS not set, automatic backups disabled");
            None
        }
    };

    let shutdown = CancellationToken::new();
    let socket = match &config.status_socket_addr {
        Some(addr) => {
            let socket =
                StatusSocket::bind(addr, backup.clone(), StatusSocketConfig::default()).await?;
            Some(socket.spawn(shutdown.clone()))
        }
        None => None,
    };

    let app = build_app(AxumAppState {
        db_pool: pool,
        backup,
    });

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
            server_shutdown.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Some(socket) = socket {
        let _ = socket.await;
    }

    Ok(())
}

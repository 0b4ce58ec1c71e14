//! Vaultq Daemon - Main Entry Point
//!
//! Composition root: wires the SQLite status store, the worker pools, the
//! liveness sweeper, the retention scheduler and the JSON-RPC server.

mod handlers;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use handlers::{EmailNotificationHandler, FileProcessingHandler, TempFileCleanupHandler};
use vaultq_api_rpc::{RpcServer, RpcServerConfig};
use vaultq_core::application::worker::constants::{
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS,
};
use vaultq_core::application::{
    shutdown_channel, JobManager, LivenessSweeper, RetentionScheduler, RetryPolicy, WorkerPool,
};
use vaultq_core::domain::{JobType, QueueConfig};
use vaultq_core::port::handler::HandlerRegistry;
use vaultq_core::port::id_provider::UuidProvider;
use vaultq_core::port::time_provider::SystemTimeProvider;
use vaultq_core::port::MaintenanceConfig;
use vaultq_infra_sqlite::{create_pool, run_migrations, SqliteJobRepository, SqliteMaintenance};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_DB_PATH: &str = "~/.vaultq/vaultq.db";
const DEFAULT_DATA_DIR: &str = "~/.vaultq";
const DEFAULT_TEMP_MAX_AGE_MS: u64 = 24 * 60 * 60 * 1000;

/// Queue topology of the vault service
fn queue_configs() -> Vec<QueueConfig> {
    vec![
        QueueConfig::new("file-processing", 2),
        QueueConfig::new("ai-analysis", 1),
        QueueConfig::new("transcription", 1).with_handler_timeout_ms(30 * 60 * 1000),
        QueueConfig::new("notification", 4),
        QueueConfig::new("cleanup", 1),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("VAULTQ_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("vaultq=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Vaultq job engine v{} starting...", VERSION);

    // 2. Load configuration
    let db_path = std::env::var("VAULTQ_DB_PATH")
        .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_DB_PATH).into_owned());
    let data_dir = std::env::var("VAULTQ_DATA_DIR")
        .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_DATA_DIR).into_owned());
    let rpc_port: u16 = std::env::var("VAULTQ_RPC_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9641);

    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!(db_path = %db_path, "Initializing database...");

    // 3. Initialize database
    let pool = create_pool(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let job_repo = Arc::new(SqliteJobRepository::new(pool.clone()));
    let maintenance = Arc::new(SqliteMaintenance::new(pool.clone(), time_provider.clone()));
    let retry_policy = Arc::new(RetryPolicy::new(
        DEFAULT_RETRY_BASE_DELAY_MS,
        DEFAULT_RETRY_MAX_DELAY_MS,
    ));

    // 5. Register job handlers
    let mut registry = HandlerRegistry::new();
    registry.register(JobType::FileProcessing, Arc::new(FileProcessingHandler))?;
    registry.register(
        JobType::EmailNotification,
        Arc::new(EmailNotificationHandler::new(format!("{}/outbox", data_dir))),
    )?;
    registry.register(
        JobType::TempFileCleanup,
        Arc::new(TempFileCleanupHandler::new(
            format!("{}/tmp", data_dir),
            DEFAULT_TEMP_MAX_AGE_MS,
        )),
    )?;
    let registry = Arc::new(registry);
    info!(handlers = registry.len(), "Job handlers registered");

    // 6. Recover jobs orphaned by a previous crash, then keep sweeping
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let sweeper = LivenessSweeper::new(
        job_repo.clone(),
        retry_policy.clone(),
        time_provider.clone(),
        None,
    );
    match sweeper.sweep_once().await {
        Ok(count) => info!(recovered_jobs = count, "Startup liveness sweep completed"),
        Err(e) => tracing::error!(error = ?e, "Startup liveness sweep failed"),
    }
    tokio::spawn(sweeper.run(shutdown_rx.clone()));

    // 7. Start worker pools (one per queue)
    let queues = queue_configs();
    let mut worker_handles = Vec::new();
    for queue in &queues {
        info!(queue = %queue.name, workers = queue.workers, "Starting worker pool");
        worker_handles.extend(WorkerPool::spawn(
            queue.clone(),
            job_repo.clone(),
            registry.clone(),
            retry_policy.clone(),
            time_provider.clone(),
            shutdown_rx.clone(),
        ));
    }

    // 8. Start retention scheduler
    let maintenance_config = MaintenanceConfig::default();
    let retention = RetentionScheduler::new(maintenance.clone(), maintenance_config.clone(), 24);
    tokio::spawn(retention.run());

    // 9. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let manager = Arc::new(JobManager::new(
        queues,
        job_repo.clone(),
        id_provider,
        time_provider.clone(),
    ));
    let rpc_config = RpcServerConfig {
        port: rpc_port,
        ..Default::default()
    };
    let rpc_server = RpcServer::new(
        rpc_config,
        manager,
        maintenance.clone(),
        maintenance_config,
    );
    let rpc_handle = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!("System ready. Waiting for jobs...");
    info!("Press Ctrl+C to shutdown");

    // 10. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 11. Graceful shutdown: stop claiming, let in-flight jobs finish
    shutdown_tx.shutdown();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    for handle in worker_handles {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete.");

    Ok(())
}

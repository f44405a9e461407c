//! bank_ledger worker
//!
//! Connects to PostgreSQL and runs the overdue payment sweep until
//! interrupted. Ledger and credit operations are exposed by the library
//! crate to whichever front end embeds it.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bank_ledger::config::LogFormat;
use bank_ledger::credit::PaymentProcessor;
use bank_ledger::jobs::{OverdueScheduler, OverdueSchedulerConfig};
use bank_ledger::store::{PgStore, Store};
use bank_ledger::{db, AppError, Config};

/// Initialize tracing/logging
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bank_ledger=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(environment = %config.environment, "Starting bank_ledger worker");
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(AppError::SchemaIncomplete.into());
    }

    tracing::info!("Database connected successfully");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
    let processor = PaymentProcessor::new(Arc::clone(&store), config.credit_policy());
    let scheduler = OverdueScheduler::with_config(
        store,
        processor,
        OverdueSchedulerConfig {
            sweep_interval: config.sweep_interval(),
        },
    )
    .start();

    shutdown_signal().await;

    // Cleanup
    tracing::info!("Worker shutting down...");
    scheduler.stop().await;
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

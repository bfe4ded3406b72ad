//! Background worker draining the ticket job queue.

mod config;

use std::sync::Arc;

use actors::{EmailTemplate, JobHandlers, WorkerContext, WorkerPool};
use db::DbConfig;
use job_queue::{QueueConfig, RetryPolicy};
use mail::SmtpMailer;
use storage::Storage;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; the environment may be set elsewhere.
    let _ = dotenvy::dotenv();
    init_tracing();

    tracing::info!("Starting ticket worker...");

    let db_config = DbConfig::from_env();
    config::ensure_shared_database(&db_config)?;
    let db = db::init(&db_config).await?;
    let storage = Storage::from_env().await?;
    let mailer = SmtpMailer::from_env()?;
    let queue = job_queue::connect(&QueueConfig::from_env()?).await?;
    let retry = RetryPolicy::from_env()?;
    let settings = config::worker_settings()?;

    tracing::info!(
        storage = storage.kind_str(),
        max_attempts = retry.max_attempts,
        poll_timeout_ms = settings.poll_timeout.as_millis() as u64,
        "Worker configured"
    );

    let handlers = JobHandlers::new(
        db.clone(),
        storage,
        Arc::new(mailer),
        retry,
        EmailTemplate::from_env(),
    );
    let context = WorkerContext {
        queue,
        handlers: Arc::new(handlers),
        db,
        retry,
        settings,
        cancel: CancellationToken::new(),
    };

    let pool = WorkerPool::start_all(context).await?;
    tracing::info!(workers = ?pool.workers().await, "Worker pool running");

    shutdown_signal().await;
    tracing::info!("Shutdown requested, finishing in-flight jobs");
    pool.shutdown();
    pool.join().await?;

    tracing::info!("Worker stopped");
    Ok(())
}

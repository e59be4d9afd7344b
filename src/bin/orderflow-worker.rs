//! # Orderflow Worker
//!
//! Wiring demo for [`WorkerRuntime`]: loads configuration, starts a pool and
//! drains it on Ctrl+C or SIGTERM.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin orderflow-worker
//!
//! # Run with a specific environment and config directory
//! ORDERFLOW_ENV=production ORDERFLOW_CONFIG_DIR=/etc/orderflow cargo run --bin orderflow-worker
//! ```
//!
//! The broker and collaborators here are in-memory and private to this
//! process, with mail written to the log. Nothing outside the process can
//! enqueue into it, so the pool stays idle unless code linked into the same
//! binary uses [`WorkerRuntime::tasks`]. Deployments embed the library and
//! call [`WorkerRuntime::start`] with the broker and store their services share.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use orderflow_core::indexing::InMemoryProductIndex;
use orderflow_core::logging;
use orderflow_core::messaging::{BackoffCalculator, InMemoryTaskBroker};
use orderflow_core::notification::LogNotifier;
use orderflow_core::store::InMemoryOrderStore;
use orderflow_core::worker::{TaskRouter, WorkerRuntime};
use orderflow_core::ConfigManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        build_mode = if cfg!(debug_assertions) { "debug" } else { "release" },
        "Starting orderflow worker"
    );

    let manager = ConfigManager::load().context("failed to load configuration")?;
    let config = manager.config();
    info!(
        environment = manager.environment(),
        config_directory = %manager.config_directory().display(),
        "Configuration ready"
    );

    let broker = Arc::new(InMemoryTaskBroker::new(
        config.broker.lease_grace(),
        BackoffCalculator::new(config.backoff.clone()),
    ));
    let router = Arc::new(TaskRouter::with_collaborators(
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(LogNotifier),
        Arc::new(InMemoryProductIndex::new()),
    ));

    let runtime = WorkerRuntime::start(config, broker, router)
        .context("invalid worker pool configuration")?;

    info!("Worker pool running, press Ctrl+C to shut down gracefully");

    shutdown_signal().await?;

    info!(
        grace_seconds = runtime.shutdown_grace().as_secs(),
        "Shutdown signal received, draining"
    );
    match runtime.shutdown().await {
        Ok(stats) => info!(stats = ?stats, "Worker pool stopped"),
        Err(e) => {
            error!(error = %e, "Worker pool did not stop cleanly");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            info!("Received Ctrl+C");
            result
        },
        result = terminate => {
            info!("Received SIGTERM");
            result
        },
    }
}

//! Server selector
//!
//! Gates queued build tasks onto named servers, one task per server, and
//! reclaims servers whose tasks disappeared from the scheduler.

use std::sync::Arc;

use anyhow::Result;
use servsel_core::Allocator;
use servsel_selector::{
    api, config,
    config::InventorySourceConfig,
    inventory::{CommandSource, FileSource, InventorySource, InventoryWorker, InventoryWorkerConfig},
    probe::HttpSchedulerProbe,
    state::AppState,
    worker::{ReconcileWorker, ReconcileWorkerConfig},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to SERVSEL_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting server selector");
    info!(
        listen_addr = %config.listen_addr,
        categories = config.categories.len(),
        stuck_threshold = config.stuck_threshold,
        "Configuration loaded"
    );

    let allocator = Arc::new(Allocator::new(config.allocator()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers: Vec<(&str, JoinHandle<()>)> = Vec::new();

    // Inventory refresh
    let source: Option<Arc<dyn InventorySource>> = match &config.inventory_source {
        InventorySourceConfig::Command {
            servers,
            environments,
        } => Some(Arc::new(CommandSource::new(
            servers.clone(),
            environments.clone(),
            config.categories.clone(),
        ))),
        InventorySourceConfig::File(path) => Some(Arc::new(FileSource::new(path.clone()))),
        InventorySourceConfig::Push => {
            info!("No inventory source configured; expecting pushes on /v1/inventory");
            None
        }
    };
    if let Some(source) = source {
        let inventory_worker = InventoryWorker::new(
            Arc::clone(&allocator),
            source,
            InventoryWorkerConfig {
                interval: config.inventory_interval,
            },
        );
        let handle = tokio::spawn({
            let shutdown_rx = shutdown_rx.clone();
            async move {
                inventory_worker.run(shutdown_rx).await;
            }
        });
        workers.push(("Inventory", handle));
    }

    // Stuck-server reclamation
    match &config.scheduler_url {
        Some(url) => {
            let probe = HttpSchedulerProbe::new(url)?;
            let reconcile_worker = ReconcileWorker::new(
                Arc::clone(&allocator),
                Arc::new(probe),
                ReconcileWorkerConfig {
                    interval: config.reconcile_interval,
                },
            );
            let handle = tokio::spawn({
                let shutdown_rx = shutdown_rx.clone();
                async move {
                    reconcile_worker.run(shutdown_rx).await;
                }
            });
            workers.push(("Reconcile", handle));
        }
        None => {
            warn!("SERVSEL_SCHEDULER_URL not set; abandoned servers will not be reclaimed");
        }
    }

    let state = AppState::new(
        Arc::clone(&allocator),
        config.build_env_rules(),
        config.categories.clone(),
    );
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);
    for (name, handle) in workers {
        if let Err(e) = tokio::time::timeout(shutdown_timeout, handle).await {
            warn!(worker = name, error = %e, "Worker did not shut down in time");
        }
    }

    info!("Server selector shutdown complete");
    Ok(())
}

//! Periodic inventory refresh.
//!
//! The worker fetches a full snapshot from the configured source without
//! touching the allocator, then applies it in one step. A failed fetch leaves
//! the registry as it was.

mod command;
mod file;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use servsel_core::{Allocator, InventoryReport, InventorySnapshot};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, instrument};

pub use command::CommandSource;
pub use file::FileSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to run inventory command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("inventory command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("failed to read inventory file: {0}")]
    Read(#[source] std::io::Error),

    #[error("invalid inventory data: {0}")]
    Parse(String),
}

/// Produces complete inventory snapshots.
#[async_trait]
pub trait InventorySource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<InventorySnapshot, SourceError>;
}

/// Configuration for the inventory worker.
#[derive(Debug, Clone)]
pub struct InventoryWorkerConfig {
    /// Time between refreshes.
    pub interval: Duration,
}

impl Default for InventoryWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Background worker that keeps the registry in step with the fleet.
pub struct InventoryWorker {
    allocator: Arc<Allocator>,
    source: Arc<dyn InventorySource>,
    config: InventoryWorkerConfig,
}

impl InventoryWorker {
    /// Create a new inventory worker.
    pub fn new(
        allocator: Arc<Allocator>,
        source: Arc<dyn InventorySource>,
        config: InventoryWorkerConfig,
    ) -> Self {
        Self {
            allocator,
            source,
            config,
        }
    }

    /// Run until shutdown is signaled. The first refresh happens immediately
    /// so the registry is populated before the first admission check.
    #[instrument(skip(self, shutdown), fields(source = self.source.name()))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting inventory worker"
        );

        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        error!(error = %e, "Inventory refresh failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Inventory worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fetch then apply one snapshot.
    pub async fn refresh(&self) -> Result<InventoryReport, SourceError> {
        let snapshot = self.source.fetch().await?;
        Ok(self.allocator.apply_inventory(&snapshot).await)
    }
}

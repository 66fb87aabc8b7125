//! Reconciliation background worker.
//!
//! Runs the stuck-server sweep on a periodic interval.

use std::sync::Arc;
use std::time::Duration;

use servsel_core::{Allocator, SchedulerProbe};
use tokio::sync::watch;
use tracing::{info, instrument};

/// Configuration for the reconcile worker.
#[derive(Debug, Clone)]
pub struct ReconcileWorkerConfig {
    /// Time between reconciliation passes.
    pub interval: Duration,
}

impl Default for ReconcileWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Background worker that releases servers whose tasks vanished.
pub struct ReconcileWorker {
    /// Allocator whose bindings are checked.
    allocator: Arc<Allocator>,

    /// Scheduler liveness queries.
    probe: Arc<dyn SchedulerProbe>,

    config: ReconcileWorkerConfig,
}

impl ReconcileWorker {
    /// Create a new reconcile worker.
    pub fn new(
        allocator: Arc<Allocator>,
        probe: Arc<dyn SchedulerProbe>,
        config: ReconcileWorkerConfig,
    ) -> Self {
        Self {
            allocator,
            probe,
            config,
        }
    }

    /// Run the worker until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting reconcile worker"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        // Skip the immediate first tick; nothing is bound at startup.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.allocator.reconcile(self.probe.as_ref()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Reconcile worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use servsel_core::{
        AdmissionRequest, AllocatorConfig, InventorySnapshot, ItemId, MockScheduler,
        ServerSnapshot,
    };

    #[tokio::test]
    async fn test_worker_reclaims_abandoned_binding() {
        let allocator = Arc::new(Allocator::new(AllocatorConfig {
            stuck_threshold: 1,
            ..Default::default()
        }));
        allocator
            .apply_inventory(&InventorySnapshot {
                servers: vec![ServerSnapshot {
                    name: "b1".parse().unwrap(),
                    category: Some("build".parse().unwrap()),
                    environment: "qa".to_string(),
                    version: "1.0".to_string(),
                    in_use: false,
                }],
                environments: None,
            })
            .await;
        allocator
            .try_admit(
                &AdmissionRequest::new(ItemId::new(1), "job")
                    .with_category("build".parse().unwrap()),
            )
            .await;

        let worker = ReconcileWorker::new(
            Arc::clone(&allocator),
            Arc::new(MockScheduler::new()),
            ReconcileWorkerConfig {
                interval: Duration::from_millis(10),
            },
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(allocator.bindings().await.is_empty());
    }
}

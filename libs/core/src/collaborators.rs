//! Interfaces to the external scheduler.
//!
//! The allocator never calls these while holding its lock.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use servsel_id::{ItemId, TaskId};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::admission::AdmissionRequest;

/// Another admission gate consulted before server selection.
///
/// If any voter vetoes, the item stays queued and no server is consumed.
#[async_trait]
pub trait AdmissionVoter: Send + Sync {
    /// Name reported in block reasons.
    fn name(&self) -> &str;

    /// Returns a message when the item must not run yet.
    async fn veto(&self, request: &AdmissionRequest) -> Option<String>;
}

/// Reports whether any executor could take the task right now.
#[async_trait]
pub trait PlacementProbe: Send + Sync {
    async fn can_place(&self, request: &AdmissionRequest) -> bool;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("scheduler unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected scheduler response: {0}")]
    Unexpected(String),
}

/// Liveness queries used by reconciliation.
#[async_trait]
pub trait SchedulerProbe: Send + Sync {
    /// Whether a task with this ID is executing anywhere.
    async fn is_task_running(&self, task_id: &TaskId) -> Result<bool, ProbeError>;

    /// Whether the item is still waiting in the queue.
    async fn item_still_queued(&self, item: ItemId) -> Result<bool, ProbeError>;
}

/// In-memory scheduler for tests and local runs.
#[derive(Debug, Default)]
pub struct MockScheduler {
    running: RwLock<HashSet<TaskId>>,
    queued: RwLock<HashSet<ItemId>>,
    failing: AtomicBool,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_running(&self, task_id: &TaskId, running: bool) {
        let mut tasks = self.running.write().await;
        if running {
            tasks.insert(task_id.clone());
        } else {
            tasks.remove(task_id);
        }
    }

    pub async fn set_queued(&self, item: ItemId, queued: bool) {
        let mut items = self.queued.write().await;
        if queued {
            items.insert(item);
        } else {
            items.remove(&item);
        }
    }

    /// Makes every probe fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ProbeError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProbeError::Unavailable("mock scheduler failing".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SchedulerProbe for MockScheduler {
    async fn is_task_running(&self, task_id: &TaskId) -> Result<bool, ProbeError> {
        self.check()?;
        let running = self.running.read().await.contains(task_id);
        debug!(task_id = %task_id, running, "[MOCK] Task running query");
        Ok(running)
    }

    async fn item_still_queued(&self, item: ItemId) -> Result<bool, ProbeError> {
        self.check()?;
        let queued = self.queued.read().await.contains(&item);
        debug!(item = %item, queued, "[MOCK] Queue query");
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_scheduler_tracks_state() {
        let scheduler = MockScheduler::new();
        let task = TaskId::new("job", 1).unwrap();

        assert!(!scheduler.is_task_running(&task).await.unwrap());
        scheduler.set_running(&task, true).await;
        assert!(scheduler.is_task_running(&task).await.unwrap());

        scheduler.set_queued(ItemId::new(3), true).await;
        assert!(scheduler.item_still_queued(ItemId::new(3)).await.unwrap());
        scheduler.set_queued(ItemId::new(3), false).await;
        assert!(!scheduler.item_still_queued(ItemId::new(3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_scheduler_failing() {
        let scheduler = MockScheduler::new();
        scheduler.set_failing(true);
        let err = scheduler
            .item_still_queued(ItemId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Unavailable(_)));
    }
}

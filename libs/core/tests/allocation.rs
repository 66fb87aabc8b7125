//! Admission behaviour under concurrent callers.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use servsel_core::{
    AdmissionRequest, AdmissionVoter, Allocator, AllocatorConfig, AdmitResult, BlockReason,
    CategoryName, InventorySnapshot, ItemId, PlacementProbe, ReleaseOutcome, ServerName,
    ServerSnapshot, Target,
};

fn snapshot(name: &str, category: &str) -> ServerSnapshot {
    ServerSnapshot {
        name: name.parse().unwrap(),
        category: Some(category.parse().unwrap()),
        environment: "qa".to_string(),
        version: "1.0".to_string(),
        in_use: false,
    }
}

async fn allocator_with(servers: &[(&str, &str)]) -> Arc<Allocator> {
    let allocator = Allocator::new(AllocatorConfig::default());
    allocator
        .apply_inventory(&InventorySnapshot {
            servers: servers.iter().map(|(n, c)| snapshot(n, c)).collect(),
            environments: None,
        })
        .await;
    Arc::new(allocator)
}

fn category(name: &str) -> CategoryName {
    name.parse().unwrap()
}

fn server(name: &str) -> ServerName {
    name.parse().unwrap()
}

fn request(item: u64, category_name: &str) -> AdmissionRequest {
    AdmissionRequest::new(ItemId::new(item), format!("job {item}"))
        .with_category(category(category_name))
}

#[tokio::test]
async fn test_concurrent_first_available_picks_distinct_servers() {
    let allocator = allocator_with(&[("b1", "build"), ("b2", "build")]).await;

    let results = join_all((1..=2).map(|item| {
        let allocator = Arc::clone(&allocator);
        tokio::spawn(async move { allocator.try_admit(&request(item, "build")).await })
    }))
    .await;

    let servers: HashSet<ServerName> = results
        .into_iter()
        .map(|r| r.unwrap().admission().unwrap().server.clone())
        .collect();
    assert_eq!(servers, HashSet::from([server("b1"), server("b2")]));
}

#[tokio::test]
async fn test_concurrent_specific_requests_admit_once() {
    let allocator = allocator_with(&[("b1", "build")]).await;

    let results = join_all((1..=16).map(|item| {
        let allocator = Arc::clone(&allocator);
        tokio::spawn(async move {
            let request = request(item, "build").with_target(Target::Specific(server("b1")));
            allocator.try_admit(&request).await
        })
    }))
    .await;

    let admitted = results
        .iter()
        .filter(|r| matches!(r.as_ref().unwrap(), AdmitResult::Admitted(_)))
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(allocator.bindings().await.len(), 1);
}

#[tokio::test]
async fn test_busy_then_released() {
    let allocator = allocator_with(&[("b1", "build")]).await;

    let holder = allocator.try_admit(&request(1, "build")).await;
    let holder = holder.admission().unwrap().task_id.clone();

    let specific = request(3, "build").with_target(Target::Specific(server("b1")));
    assert_eq!(
        allocator.try_admit(&specific).await,
        AdmitResult::Blocked(BlockReason::SpecificServerBusy {
            server: server("b1"),
            holder: Some(holder.clone()),
        })
    );

    assert_eq!(
        allocator.on_complete(&holder, true).await,
        ReleaseOutcome::Released {
            server: server("b1")
        }
    );

    let admitted = allocator.try_admit(&specific).await;
    assert_eq!(admitted.admission().unwrap().server, server("b1"));
}

#[tokio::test]
async fn test_category_isolation() {
    let allocator = allocator_with(&[("t1", "test"), ("b1", "build"), ("t2", "test")]).await;

    for item in 1..=2 {
        let result = allocator.try_admit(&request(item, "test")).await;
        let admission = result.admission().unwrap();
        assert!(admission.server.as_str().starts_with('t'));
    }

    assert_eq!(
        allocator.try_admit(&request(3, "test")).await,
        AdmitResult::Blocked(BlockReason::NoFreeServer {
            category: category("test")
        })
    );
    assert!(!allocator.server(&server("b1")).await.unwrap().busy);
}

#[tokio::test]
async fn test_in_use_servers_skipped_by_first_available() {
    let allocator = Allocator::new(AllocatorConfig::default());
    let mut occupied = snapshot("b1", "build");
    occupied.in_use = true;
    allocator
        .apply_inventory(&InventorySnapshot {
            servers: vec![occupied, snapshot("b2", "build")],
            environments: None,
        })
        .await;

    let result = allocator.try_admit(&request(1, "build")).await;
    assert_eq!(result.admission().unwrap().server, server("b2"));

    // A specific request still gets the occupied server.
    let specific = request(2, "build").with_target(Target::Specific(server("b1")));
    let result = allocator.try_admit(&specific).await;
    assert_eq!(result.admission().unwrap().server, server("b1"));
}

#[tokio::test]
async fn test_idempotent_admission_across_passes() {
    let allocator = allocator_with(&[("b1", "build"), ("b2", "build")]).await;

    let first = allocator.try_admit(&request(1, "build")).await;
    for _ in 0..5 {
        assert_eq!(allocator.try_admit(&request(1, "build")).await, first);
    }

    let other = allocator.try_admit(&request(2, "build")).await;
    assert_ne!(
        other.admission().unwrap().server,
        first.admission().unwrap().server
    );
}

#[tokio::test]
async fn test_started_item_can_be_admitted_again_as_new_item() {
    let allocator = allocator_with(&[("b1", "build")]).await;

    allocator.try_admit(&request(1, "build")).await;
    let started = allocator.on_start(ItemId::new(1)).await.unwrap();
    assert_eq!(started.server, server("b1"));

    // The same item id reappearing is a new queue entry; the server is held.
    assert_eq!(
        allocator.try_admit(&request(1, "build")).await,
        AdmitResult::Blocked(BlockReason::NoFreeServer {
            category: category("build")
        })
    );

    let resolved = allocator.resolved_server_for(&started.task_id).await.unwrap();
    assert_eq!(resolved.name, server("b1"));
}

struct QuietHours;

#[async_trait]
impl AdmissionVoter for QuietHours {
    fn name(&self) -> &str {
        "quiet-hours"
    }

    async fn veto(&self, request: &AdmissionRequest) -> Option<String> {
        (request.item.value() % 2 == 0).then(|| "even items wait".to_string())
    }
}

struct NoExecutors;

#[async_trait]
impl PlacementProbe for NoExecutors {
    async fn can_place(&self, _request: &AdmissionRequest) -> bool {
        false
    }
}

#[tokio::test]
async fn test_voters_and_placement_run_before_selection() {
    let allocator = Allocator::new(AllocatorConfig::default()).with_voter(Arc::new(QuietHours));
    allocator
        .apply_inventory(&InventorySnapshot {
            servers: vec![snapshot("b1", "build")],
            environments: None,
        })
        .await;

    assert_eq!(
        allocator.try_admit(&request(2, "build")).await,
        AdmitResult::Blocked(BlockReason::Vetoed {
            voter: "quiet-hours".to_string(),
            message: "even items wait".to_string(),
        })
    );
    assert!(allocator.bindings().await.is_empty());
    assert!(allocator.try_admit(&request(1, "build")).await.admission().is_some());

    let unplaceable =
        Allocator::new(AllocatorConfig::default()).with_placement(Arc::new(NoExecutors));
    assert_eq!(
        unplaceable.try_admit(&request(1, "build")).await,
        AdmitResult::Blocked(BlockReason::NoPlacement)
    );
}

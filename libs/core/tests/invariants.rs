//! Allocator invariants under random operation sequences.
//!
//! After every operation:
//! - a server is `busy` iff exactly one exclusive binding references it, and
//!   its `bound_task` names that binding
//! - every exclusive binding points at a registered server
//! - no two exclusive bindings share a server

use std::collections::HashMap;

use proptest::prelude::*;
use servsel_core::{
    AdmissionRequest, Allocator, AllocatorConfig, InventorySnapshot, ItemId, MockScheduler,
    ServerName, ServerSnapshot, Target, TaskId,
};

const SERVERS: [(&str, &str); 4] = [
    ("b1", "build"),
    ("b2", "build"),
    ("t1", "test"),
    ("t2", "test"),
];

#[derive(Debug, Clone)]
enum Op {
    Admit {
        item: u64,
        test_category: bool,
        target: Option<usize>,
        exclusive: bool,
    },
    Start(u64),
    Complete { task: usize, succeeded: bool },
    Finalize(usize),
    Forget(u64),
    Reconcile { running: bool },
    Inventory { keep: [bool; 4] },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u64..8, any::<bool>(), proptest::option::of(0usize..4), prop::bool::weighted(0.8))
            .prop_map(|(item, test_category, target, exclusive)| Op::Admit {
                item,
                test_category,
                target,
                exclusive,
            }),
        2 => (0u64..8).prop_map(Op::Start),
        2 => (0usize..16, any::<bool>())
            .prop_map(|(task, succeeded)| Op::Complete { task, succeeded }),
        1 => (0usize..16).prop_map(Op::Finalize),
        1 => (0u64..8).prop_map(Op::Forget),
        1 => any::<bool>().prop_map(|running| Op::Reconcile { running }),
        1 => any::<[bool; 4]>().prop_map(|keep| Op::Inventory { keep }),
    ]
}

fn snapshot(name: &str, category: &str) -> ServerSnapshot {
    ServerSnapshot {
        name: name.parse().unwrap(),
        category: Some(category.parse().unwrap()),
        environment: "qa".to_string(),
        version: "1.0".to_string(),
        in_use: false,
    }
}

fn inventory(keep: [bool; 4]) -> InventorySnapshot {
    InventorySnapshot {
        servers: SERVERS
            .iter()
            .zip(keep)
            .filter(|(_, keep)| *keep)
            .map(|((n, c), _)| snapshot(n, c))
            .collect(),
        environments: None,
    }
}

async fn check_invariants(allocator: &Allocator) -> Result<(), TestCaseError> {
    let servers = allocator.servers().await;
    let bindings = allocator.bindings().await;

    let mut holders: HashMap<ServerName, Vec<TaskId>> = HashMap::new();
    for binding in &bindings {
        holders
            .entry(binding.server.clone())
            .or_default()
            .push(binding.task_id.clone());
    }

    for server in &servers {
        let held = holders.remove(&server.name).unwrap_or_default();
        prop_assert!(held.len() <= 1, "{} bound {} times", server.name, held.len());
        prop_assert_eq!(server.busy, held.len() == 1, "busy flag of {}", server.name);
        prop_assert_eq!(server.bound_task.as_ref(), held.first());
    }

    prop_assert!(
        holders.is_empty(),
        "bindings reference unknown servers: {:?}",
        holders.keys().collect::<Vec<_>>()
    );
    Ok(())
}

async fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let allocator = Allocator::new(AllocatorConfig::default());
    let scheduler = MockScheduler::new();
    allocator.apply_inventory(&inventory([true; 4])).await;

    let mut tasks: Vec<TaskId> = Vec::new();

    for op in ops {
        match op {
            Op::Admit {
                item,
                test_category,
                target,
                exclusive,
            } => {
                let category = if test_category { "test" } else { "build" };
                let mut request = AdmissionRequest::new(ItemId::new(item), "job")
                    .with_category(category.parse().unwrap());
                if let Some(i) = target {
                    request = request.with_target(Target::Specific(SERVERS[i].0.parse().unwrap()));
                }
                if !exclusive {
                    request = request.non_exclusive();
                }

                let result = allocator.try_admit(&request).await;
                if let Some(admission) = result.admission() {
                    if !tasks.contains(&admission.task_id) {
                        tasks.push(admission.task_id.clone());
                    }
                    if admission.exclusive {
                        // First-available never crosses categories.
                        if target.is_none() {
                            let server = allocator.server(&admission.server).await;
                            prop_assert_eq!(
                                server.and_then(|s| s.category).map(|c| c.to_string()),
                                Some(category.to_string())
                            );
                        }
                    }
                }
            }
            Op::Start(item) => {
                allocator.on_start(ItemId::new(item)).await;
            }
            Op::Complete { task, succeeded } => {
                if let Some(task_id) = tasks.get(task) {
                    allocator.on_complete(task_id, succeeded).await;
                }
            }
            Op::Finalize(task) => {
                if let Some(task_id) = tasks.get(task) {
                    allocator.on_finalize(task_id).await;
                }
            }
            Op::Forget(item) => {
                allocator.forget_item(ItemId::new(item)).await;
            }
            Op::Reconcile { running } => {
                for task_id in &tasks {
                    scheduler.set_running(task_id, running).await;
                }
                allocator.reconcile(&scheduler).await;
            }
            Op::Inventory { keep } => {
                allocator.apply_inventory(&inventory(keep)).await;
            }
        }

        check_invariants(&allocator).await?;
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn test_binding_invariants_hold(ops in prop::collection::vec(arb_op(), 1..60)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(ops))?;
    }

    #[test]
    fn test_all_servers_free_after_releasing_everything(
        ops in prop::collection::vec(arb_op(), 1..40)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let allocator = Allocator::new(AllocatorConfig::default());
            allocator.apply_inventory(&inventory([true; 4])).await;

            for (n, op) in ops.iter().enumerate() {
                if let Op::Admit { item, test_category, .. } = op {
                    let category = if *test_category { "test" } else { "build" };
                    let request = AdmissionRequest::new(ItemId::new(*item + n as u64 * 8), "job")
                        .with_category(category.parse().unwrap());
                    allocator.try_admit(&request).await;
                }
            }

            for binding in allocator.bindings().await {
                allocator.on_complete(&binding.task_id, true).await;
            }

            for server in allocator.servers().await {
                prop_assert!(!server.busy, "{} still busy", server.name);
            }
            Ok(())
        })?;
    }
}

//! The admission gateway.
//!
//! [`Allocator`] owns the registry, the binding table, the per-item admission
//! markers and the environment catalog behind one async mutex. Every
//! selection+bind happens inside a single critical section; collaborator
//! calls (voters, placement, probes) happen before the lock is taken.

use std::collections::HashMap;
use std::sync::Arc;

use servsel_id::{CategoryName, ItemId, ServerName, TaskId};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::admission::{
    Admission, AdmissionRequest, AdmitResult, BlockReason, NotApplicableReason, ReleaseOutcome,
    StartedTask, TaskKind,
};
use crate::binding::{BindError, Binding, BindingTable};
use crate::collaborators::{AdmissionVoter, PlacementProbe};
use crate::inventory::{EnvironmentCatalog, InventoryReport, InventorySnapshot};
use crate::policy::{self, DeployTarget, SelectError, Selection, Target};
use crate::registry::{ServerRegistry, UpsertOutcome};
use crate::server::{DeployOutcome, Server};

/// Display-name markers of deploy tasks by default.
pub const DEFAULT_DEPLOY_MARKERS: [&str; 2] = ["DeploySingleServer", "DeployCluster"];

#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Reconciliation passes without a live task before a server is
    /// force-released.
    pub stuck_threshold: u32,

    /// A task whose display name contains one of these records its result as
    /// the server's deploy outcome.
    pub deploy_markers: Vec<String>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            stuck_threshold: 2,
            deploy_markers: DEFAULT_DEPLOY_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl AllocatorConfig {
    pub fn is_deploy_task(&self, display_name: &str) -> bool {
        self.deploy_markers
            .iter()
            .any(|marker| !marker.is_empty() && display_name.contains(marker.as_str()))
    }

    pub(crate) fn threshold(&self) -> u32 {
        self.stuck_threshold.max(1)
    }
}

/// A task's binding together with the server it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTask {
    pub binding: Binding,

    /// `None` if the server has since left inventory.
    pub server: Option<Server>,
}

#[derive(Debug, Default)]
pub(crate) struct AllocatorState {
    pub(crate) registry: ServerRegistry,
    pub(crate) bindings: BindingTable,

    /// Items admitted but not yet started. Absent means unseen.
    pub(crate) items: HashMap<ItemId, Admission>,

    pub(crate) catalog: EnvironmentCatalog,
}

impl AllocatorState {
    /// Drops the item marker if it still points at this task.
    pub(crate) fn clear_item(&mut self, item: Option<ItemId>, task_id: &TaskId) {
        if let Some(item) = item {
            if self.items.get(&item).is_some_and(|a| &a.task_id == task_id) {
                self.items.remove(&item);
            }
        }
    }

    /// Releases an exclusive binding and frees its server.
    pub(crate) fn release_binding(&mut self, task_id: &TaskId) -> Option<Binding> {
        let binding = self.bindings.release(task_id)?;
        self.registry.mark_released(&binding.server);
        self.clear_item(binding.item, task_id);
        Some(binding)
    }

    fn release_task(
        &mut self,
        config: &AllocatorConfig,
        task_id: &TaskId,
        outcome: Option<DeployOutcome>,
    ) -> ReleaseOutcome {
        let (binding, exclusive) = match self.release_binding(task_id) {
            Some(binding) => (binding, true),
            None => match self.bindings.remove_soft(task_id) {
                Some(binding) => {
                    self.clear_item(binding.item, task_id);
                    (binding, false)
                }
                None => return ReleaseOutcome::NotBound,
            },
        };

        if let Some(outcome) = outcome {
            if config.is_deploy_task(&binding.display_name) {
                self.registry.record_deploy(&binding.server, outcome);
            }
        }

        if exclusive {
            ReleaseOutcome::Released {
                server: binding.server,
            }
        } else {
            ReleaseOutcome::SoftDropped {
                server: binding.server,
            }
        }
    }
}

/// Shared allocator. Construct once and pass around as `Arc<Allocator>`.
pub struct Allocator {
    config: AllocatorConfig,
    pub(crate) state: Mutex<AllocatorState>,
    voters: Vec<Arc<dyn AdmissionVoter>>,
    placement: Option<Arc<dyn PlacementProbe>>,
}

impl Allocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(AllocatorState::default()),
            voters: Vec::new(),
            placement: None,
        }
    }

    /// Adds an admission gate consulted before selection.
    pub fn with_voter(mut self, voter: Arc<dyn AdmissionVoter>) -> Self {
        self.voters.push(voter);
        self
    }

    pub fn with_placement(mut self, placement: Arc<dyn PlacementProbe>) -> Self {
        self.placement = Some(placement);
        self
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Decides whether a queued item may run now and on which server.
    ///
    /// Repeated calls for the same item return the same admission until the
    /// item starts or its binding is released.
    pub async fn try_admit(&self, request: &AdmissionRequest) -> AdmitResult {
        for voter in &self.voters {
            if let Some(message) = voter.veto(request).await {
                debug!(item = %request.item, voter = voter.name(), reason = %message, "Admission vetoed");
                return AdmitResult::Blocked(BlockReason::Vetoed {
                    voter: voter.name().to_string(),
                    message,
                });
            }
        }

        if let Some(placement) = &self.placement {
            if !placement.can_place(request).await {
                debug!(item = %request.item, "No executor can take the item");
                return AdmitResult::Blocked(BlockReason::NoPlacement);
            }
        }

        let category = match applicability(request) {
            Ok(category) => category,
            Err(reason) => return AdmitResult::NotApplicable { reason },
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if let Some(existing) = state.items.get(&request.item) {
            debug!(
                item = %request.item,
                task_id = %existing.task_id,
                server = %existing.server,
                "Item already admitted"
            );
            return AdmitResult::Admitted(existing.clone());
        }

        let deploy = request
            .deploy
            .as_ref()
            .and_then(|d| d.resolve(&state.catalog));

        let result = if request.exclusive {
            admit_exclusive(state, request, category, deploy.as_ref())
        } else {
            admit_soft(state, request, category, deploy.as_ref())
        };

        match result {
            Ok(admission) => {
                info!(
                    item = %request.item,
                    task_id = %admission.task_id,
                    server = %admission.server,
                    should_deploy = admission.should_deploy,
                    exclusive = admission.exclusive,
                    "Item admitted"
                );
                state.items.insert(request.item, admission.clone());
                AdmitResult::Admitted(admission)
            }
            Err(reason) => {
                debug!(item = %request.item, %reason, "Item blocked");
                AdmitResult::Blocked(reason)
            }
        }
    }

    /// Called when an admitted item leaves the queue and starts executing.
    pub async fn on_start(&self, item: ItemId) -> Option<StartedTask> {
        let mut state = self.state.lock().await;
        let Some(admission) = state.items.remove(&item) else {
            debug!(item = %item, "Started item was never admitted");
            return None;
        };

        match state.bindings.mark_started(&admission.task_id) {
            Some(binding) => {
                info!(item = %item, task_id = %binding.task_id, server = %binding.server, "Task started");
                Some(StartedTask {
                    task_id: binding.task_id.clone(),
                    server: binding.server.clone(),
                    should_deploy: binding.should_deploy,
                })
            }
            None => {
                warn!(
                    item = %item,
                    task_id = %admission.task_id,
                    "Admitted item started after its binding was released"
                );
                None
            }
        }
    }

    /// Normal completion path. Releases the binding and records the result of
    /// deploy tasks. Unknown tasks are a no-op.
    pub async fn on_complete(&self, task_id: &TaskId, succeeded: bool) -> ReleaseOutcome {
        let mut state = self.state.lock().await;
        let outcome =
            state.release_task(&self.config, task_id, Some(DeployOutcome::from_success(succeeded)));

        match &outcome {
            ReleaseOutcome::NotBound => debug!(task_id = %task_id, "Completed task held no server"),
            _ => info!(task_id = %task_id, succeeded, outcome = ?outcome, "Task completed"),
        }
        outcome
    }

    /// Finalization path. Only acts if completion never arrived, in which case
    /// a deploy task is recorded as failed.
    pub async fn on_finalize(&self, task_id: &TaskId) -> ReleaseOutcome {
        let mut state = self.state.lock().await;
        let outcome = state.release_task(&self.config, task_id, Some(DeployOutcome::Failed));

        if !matches!(outcome, ReleaseOutcome::NotBound) {
            warn!(task_id = %task_id, outcome = ?outcome, "Task finalized without completion");
        }
        outcome
    }

    /// The scheduler dropped an item from its queue. Releases the binding if
    /// the task never started.
    pub async fn forget_item(&self, item: ItemId) -> ReleaseOutcome {
        let mut state = self.state.lock().await;
        let Some(admission) = state.items.remove(&item) else {
            return ReleaseOutcome::NotBound;
        };

        let started = state
            .bindings
            .resolve(&admission.task_id)
            .is_some_and(|b| b.started);
        if started {
            return ReleaseOutcome::NotBound;
        }

        let outcome = state.release_task(&self.config, &admission.task_id, None);
        info!(item = %item, task_id = %admission.task_id, outcome = ?outcome, "Forgot queued item");
        outcome
    }

    /// Server a task was bound or soft-assigned to.
    pub async fn resolved_server_for(&self, task_id: &TaskId) -> Option<Server> {
        let state = self.state.lock().await;
        let binding = state.bindings.resolve(task_id)?;
        state.registry.get(&binding.server).cloned()
    }

    pub async fn resolved_task(&self, task_id: &TaskId) -> Option<ResolvedTask> {
        let state = self.state.lock().await;
        let binding = state.bindings.resolve(task_id)?.clone();
        let server = state.registry.get(&binding.server).cloned();
        Some(ResolvedTask { binding, server })
    }

    /// Applies a full inventory cycle: upsert reported servers, release and
    /// remove the rest, refresh the environment catalog.
    pub async fn apply_inventory(&self, snapshot: &InventorySnapshot) -> InventoryReport {
        let mut report = InventoryReport::default();
        let mut state = self.state.lock().await;

        for server in &snapshot.servers {
            match state.registry.upsert(server) {
                UpsertOutcome::Added => report.added += 1,
                UpsertOutcome::Updated => report.updated += 1,
                UpsertOutcome::Unchanged => {}
            }
            state.registry.mark_seen(&server.name);
        }

        for name in state.registry.unseen() {
            if let Some(task_id) = state.bindings.reverse_lookup(&name).cloned() {
                state.release_binding(&task_id);
                warn!(server = %name, task_id = %task_id, "Released binding of removed server");
                report.force_released.push(name);
            }
        }

        report.removed = state
            .registry
            .prune_unseen()
            .into_iter()
            .map(|s| s.name)
            .collect();

        if let Some(environments) = &snapshot.environments {
            state.catalog.apply(environments);
        }

        info!(
            servers = state.registry.len(),
            added = report.added,
            updated = report.updated,
            removed = report.removed.len(),
            force_released = report.force_released.len(),
            "Applied inventory"
        );

        report
    }

    pub async fn servers(&self) -> Vec<Server> {
        let state = self.state.lock().await;
        state.registry.servers().cloned().collect()
    }

    pub async fn server(&self, name: &ServerName) -> Option<Server> {
        let state = self.state.lock().await;
        state.registry.get(name).cloned()
    }

    pub async fn servers_in_category(&self, category: &CategoryName) -> Vec<Server> {
        let state = self.state.lock().await;
        state.registry.list_by_category(category).cloned().collect()
    }

    pub async fn categories(&self) -> Vec<CategoryName> {
        let state = self.state.lock().await;
        state.registry.categories()
    }

    /// Exclusive bindings.
    pub async fn bindings(&self) -> Vec<Binding> {
        let state = self.state.lock().await;
        state.bindings.iter().cloned().collect()
    }

    pub async fn soft_assignments(&self) -> Vec<Binding> {
        let state = self.state.lock().await;
        state.bindings.soft_assignments().cloned().collect()
    }

    pub async fn environments(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.catalog.environments().to_vec()
    }
}

fn applicability(request: &AdmissionRequest) -> Result<&CategoryName, NotApplicableReason> {
    if !request.enabled {
        return Err(NotApplicableReason::Disabled);
    }
    if request.kind == TaskKind::MatrixParent {
        return Err(NotApplicableReason::MatrixParent);
    }
    request.category.as_ref().ok_or(NotApplicableReason::NoCategory)
}

fn admit_exclusive(
    state: &mut AllocatorState,
    request: &AdmissionRequest,
    category: &CategoryName,
    deploy: Option<&DeployTarget>,
) -> Result<Admission, BlockReason> {
    let Selection {
        server,
        should_deploy,
    } = policy::select_server(
        &state.registry,
        &state.bindings,
        category,
        &request.target,
        deploy,
    )?;

    let task_id = state
        .bindings
        .bind(&request.display_name, &server, should_deploy, Some(request.item))
        .map_err(bind_block_reason)?;
    state.registry.mark_bound(&server, &task_id);

    Ok(Admission {
        task_id,
        server,
        should_deploy,
        exclusive: true,
    })
}

/// The non-exclusive path: the task learns a server but nothing is locked.
/// Concurrent soft holders of one server are not prevented, only logged.
fn admit_soft(
    state: &mut AllocatorState,
    request: &AdmissionRequest,
    category: &CategoryName,
    deploy: Option<&DeployTarget>,
) -> Result<Admission, BlockReason> {
    let selection = match &request.target {
        Target::FirstAvailable => policy::first_available(&state.registry, category, deploy)?,
        Target::Specific(name) => {
            let server = state
                .registry
                .get(name)
                .filter(|s| s.category.is_some())
                .ok_or_else(|| SelectError::UnknownServer {
                    name: name.to_string(),
                })?;
            Selection {
                server: server.name.clone(),
                should_deploy: server.needs_deploy(deploy),
            }
        }
    };

    let others = state.bindings.soft_holders(&selection.server).len();
    let busy = state
        .registry
        .get(&selection.server)
        .is_some_and(|s| s.busy);
    if others > 0 || busy {
        warn!(
            server = %selection.server,
            soft_holders = others,
            busy,
            "Non-exclusive assignment shares a server"
        );
    }

    let task_id = state
        .bindings
        .assign_soft(
            &request.display_name,
            &selection.server,
            selection.should_deploy,
            Some(request.item),
        )
        .map_err(bind_block_reason)?;

    Ok(Admission {
        task_id,
        server: selection.server,
        should_deploy: selection.should_deploy,
        exclusive: false,
    })
}

fn bind_block_reason(err: BindError) -> BlockReason {
    match err {
        BindError::ServerTaken { server, holder } => BlockReason::SpecificServerBusy {
            server,
            holder: Some(holder),
        },
        BindError::InvalidTaskName(e) => BlockReason::InvalidTask {
            message: e.to_string(),
        },
    }
}

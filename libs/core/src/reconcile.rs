//! Stuck-server reclamation.
//!
//! A pass runs in three phases so the allocator lock is never held across a
//! scheduler query:
//!
//! 1. Snapshot every binding and soft assignment under the lock
//! 2. Probe liveness of each without the lock
//! 3. Apply counters under the lock, skipping entries that were released,
//!    rebound or started meanwhile
//!
//! An unstarted binding is live while its item is still queued (or its task
//! already runs); a started binding is live while its task runs. A server
//! whose binding is not live for `stuck_threshold` consecutive passes is
//! force-released. A probe error leaves the counter where it was.

use servsel_id::{ItemId, ServerName, TaskId};
use tracing::{debug, info, instrument, warn};

use crate::allocator::Allocator;
use crate::collaborators::{ProbeError, SchedulerProbe};

/// Statistics from a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub checked: usize,
    pub live: usize,
    pub stuck: usize,
    pub reclaimed: usize,
    pub probe_errors: usize,
    pub soft_pruned: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    task_id: TaskId,
    server: ServerName,
    item: Option<ItemId>,
    started: bool,
    exclusive: bool,
    generation: u64,
}

#[derive(Debug)]
enum Liveness {
    Live,
    Missing,
    Unknown(ProbeError),
}

impl Allocator {
    /// Runs one reconciliation pass.
    #[instrument(skip(self, probe))]
    pub async fn reconcile(&self, probe: &dyn SchedulerProbe) -> ReconcileStats {
        let candidates = self.snapshot_candidates().await;
        debug!(candidates = candidates.len(), "Reconciling bindings");

        let mut observed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let liveness = probe_liveness(probe, &candidate).await;
            observed.push((candidate, liveness));
        }

        let stats = self.apply_observations(observed).await;

        if stats.reclaimed > 0 || stats.stuck > 0 || stats.probe_errors > 0 {
            info!(
                checked = stats.checked,
                live = stats.live,
                stuck = stats.stuck,
                reclaimed = stats.reclaimed,
                probe_errors = stats.probe_errors,
                soft_pruned = stats.soft_pruned,
                "Reconciliation pass complete"
            );
        } else {
            debug!(checked = stats.checked, "Reconciliation pass complete");
        }

        stats
    }

    async fn snapshot_candidates(&self) -> Vec<Candidate> {
        let mut state = self.state.lock().await;

        state.registry.reset_idle_counters();

        state
            .bindings
            .iter()
            .chain(state.bindings.soft_assignments())
            .map(|b| Candidate {
                task_id: b.task_id.clone(),
                server: b.server.clone(),
                item: b.item,
                started: b.started,
                exclusive: b.exclusive,
                generation: b.generation,
            })
            .collect()
    }

    async fn apply_observations(&self, observed: Vec<(Candidate, Liveness)>) -> ReconcileStats {
        let threshold = self.config().threshold();
        let mut stats = ReconcileStats::default();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        for (candidate, liveness) in observed {
            if !still_current(state, &candidate) {
                debug!(task_id = %candidate.task_id, "Binding changed during pass, skipping");
                continue;
            }

            stats.checked += 1;

            let misses = match liveness {
                Liveness::Live => {
                    stats.live += 1;
                    Some(0)
                }
                Liveness::Unknown(e) => {
                    stats.probe_errors += 1;
                    warn!(
                        task_id = %candidate.task_id,
                        server = %candidate.server,
                        error = %e,
                        "Scheduler probe failed, not counting this pass"
                    );
                    None
                }
                Liveness::Missing => {
                    stats.stuck += 1;
                    let counter = if candidate.exclusive {
                        state
                            .registry
                            .get_mut(&candidate.server)
                            .map(|s| &mut s.stuck_counter)
                    } else {
                        state
                            .bindings
                            .soft_mut(&candidate.task_id)
                            .map(|b| &mut b.misses)
                    };
                    counter.map(|c| {
                        *c += 1;
                        *c
                    })
                }
            };

            let Some(misses) = misses else {
                continue;
            };

            if misses == 0 {
                reset_counter(state, &candidate);
                continue;
            }

            if misses < threshold {
                info!(
                    task_id = %candidate.task_id,
                    server = %candidate.server,
                    misses,
                    threshold,
                    "Bound task not found"
                );
                continue;
            }

            if candidate.exclusive {
                state.release_binding(&candidate.task_id);
                stats.reclaimed += 1;
                warn!(
                    task_id = %candidate.task_id,
                    server = %candidate.server,
                    misses,
                    "Reclaimed stuck server"
                );
            } else if let Some(binding) = state.bindings.remove_soft(&candidate.task_id) {
                state.clear_item(binding.item, &candidate.task_id);
                stats.soft_pruned += 1;
                info!(
                    task_id = %candidate.task_id,
                    server = %candidate.server,
                    "Pruned stale soft assignment"
                );
            }
        }

        stats
    }
}

/// The snapshotted binding is the one still in the table, in the same
/// lifecycle phase. A released-then-rebound task reuses its ID, so the
/// generation decides.
fn still_current(state: &crate::allocator::AllocatorState, candidate: &Candidate) -> bool {
    let current = if candidate.exclusive {
        state
            .bindings
            .reverse_lookup(&candidate.server)
            .filter(|task_id| *task_id == &candidate.task_id)
            .and_then(|task_id| state.bindings.lookup(task_id))
    } else {
        state.bindings.resolve(&candidate.task_id)
    };

    current.is_some_and(|binding| {
        binding.generation == candidate.generation
            && binding.exclusive == candidate.exclusive
            && binding.started == candidate.started
    })
}

fn reset_counter(state: &mut crate::allocator::AllocatorState, candidate: &Candidate) {
    if candidate.exclusive {
        if let Some(server) = state.registry.get_mut(&candidate.server) {
            server.stuck_counter = 0;
        }
    } else if let Some(binding) = state.bindings.soft_mut(&candidate.task_id) {
        binding.misses = 0;
    }
}

async fn probe_liveness(probe: &dyn SchedulerProbe, candidate: &Candidate) -> Liveness {
    if !candidate.started {
        if let Some(item) = candidate.item {
            match probe.item_still_queued(item).await {
                Ok(true) => return Liveness::Live,
                Ok(false) => {}
                Err(e) => return Liveness::Unknown(e),
            }
        }
    }

    match probe.is_task_running(&candidate.task_id).await {
        Ok(true) => Liveness::Live,
        Ok(false) => Liveness::Missing,
        Err(e) => Liveness::Unknown(e),
    }
}

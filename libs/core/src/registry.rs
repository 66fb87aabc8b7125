//! Server registry.
//!
//! Holds every known server and its live state. Inventory drives membership
//! through [`ServerRegistry::upsert`] and the mark-and-sweep pair
//! [`ServerRegistry::mark_seen`] / [`ServerRegistry::prune_unseen`]; the
//! allocator drives `busy`, `bound_task`, `stuck_counter` and `last_deploy`.

use std::collections::HashMap;

use servsel_id::{CategoryName, ServerName, TaskId};
use tracing::info;

use crate::inventory::ServerSnapshot;
use crate::server::{DeployOutcome, Server};

/// Effect of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
    Unchanged,
}

/// Known servers, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: HashMap<ServerName, Server>,
    order: Vec<ServerName>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a server or refreshes its inventory-owned fields.
    pub fn upsert(&mut self, snapshot: &ServerSnapshot) -> UpsertOutcome {
        let Some(server) = self.servers.get_mut(&snapshot.name) else {
            info!(
                server = %snapshot.name,
                category = ?snapshot.category.as_ref().map(CategoryName::as_str),
                environment = %snapshot.environment,
                version = %snapshot.version,
                "Server added"
            );
            self.order.push(snapshot.name.clone());
            self.servers
                .insert(snapshot.name.clone(), Server::from_snapshot(snapshot));
            return UpsertOutcome::Added;
        };

        let mut changed = false;

        if server.category != snapshot.category {
            info!(
                server = %server.name,
                from = ?server.category.as_ref().map(CategoryName::as_str),
                to = ?snapshot.category.as_ref().map(CategoryName::as_str),
                "Server category changed"
            );
            server.category = snapshot.category.clone();
            changed = true;
        }

        if server.environment != snapshot.environment || server.version != snapshot.version {
            info!(
                server = %server.name,
                environment = %snapshot.environment,
                version = %snapshot.version,
                previous_environment = %server.environment,
                previous_version = %server.version,
                "Server deployment changed"
            );
            server.environment = snapshot.environment.clone();
            server.version = snapshot.version.clone();
            changed = true;
        }

        if server.in_use != snapshot.in_use {
            info!(server = %server.name, in_use = snapshot.in_use, "Server in_use changed");
            server.in_use = snapshot.in_use;
            changed = true;
        }

        if changed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Unchanged
        }
    }

    /// Marks a server as reported in the current inventory cycle.
    pub fn mark_seen(&mut self, name: &ServerName) {
        if let Some(server) = self.servers.get_mut(name) {
            server.seen = true;
        }
    }

    /// Servers not reported in the current inventory cycle.
    pub fn unseen(&self) -> Vec<ServerName> {
        self.order
            .iter()
            .filter(|name| self.servers.get(*name).is_some_and(|s| !s.seen))
            .cloned()
            .collect()
    }

    /// Removes every server not seen this cycle and clears the flag on the
    /// survivors. Bound servers must be released beforehand.
    pub fn prune_unseen(&mut self) -> Vec<Server> {
        let mut removed = Vec::new();
        let servers = &mut self.servers;

        self.order.retain(|name| {
            let keep = servers.get(name).is_some_and(|s| s.seen);
            if !keep {
                if let Some(server) = servers.remove(name) {
                    info!(server = %name, "Server removed");
                    removed.push(server);
                }
            }
            keep
        });

        for server in self.servers.values_mut() {
            server.seen = false;
        }

        removed
    }

    pub fn get(&self, name: &ServerName) -> Option<&Server> {
        self.servers.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &ServerName) -> Option<&mut Server> {
        self.servers.get_mut(name)
    }

    pub fn contains(&self, name: &ServerName) -> bool {
        self.servers.contains_key(name)
    }

    /// All servers in insertion order.
    pub fn servers(&self) -> impl Iterator<Item = &Server> {
        self.order.iter().filter_map(|name| self.servers.get(name))
    }

    /// Servers of one category in insertion order.
    pub fn list_by_category<'a>(
        &'a self,
        category: &'a CategoryName,
    ) -> impl Iterator<Item = &'a Server> + 'a {
        self.servers().filter(move |s| s.in_category(category))
    }

    /// Distinct categories in order of first appearance.
    pub fn categories(&self) -> Vec<CategoryName> {
        let mut categories: Vec<CategoryName> = Vec::new();
        for category in self.servers().filter_map(|s| s.category.as_ref()) {
            if !categories.contains(category) {
                categories.push(category.clone());
            }
        }
        categories
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub(crate) fn mark_bound(&mut self, name: &ServerName, task_id: &TaskId) -> bool {
        match self.servers.get_mut(name) {
            Some(server) => {
                server.busy = true;
                server.bound_task = Some(task_id.clone());
                server.stuck_counter = 0;
                true
            }
            None => false,
        }
    }

    pub(crate) fn mark_released(&mut self, name: &ServerName) {
        if let Some(server) = self.servers.get_mut(name) {
            server.busy = false;
            server.bound_task = None;
            server.stuck_counter = 0;
        }
    }

    /// Unbound servers never carry a stuck count.
    pub(crate) fn reset_idle_counters(&mut self) {
        for server in self.servers.values_mut().filter(|s| !s.busy) {
            server.stuck_counter = 0;
        }
    }

    pub(crate) fn record_deploy(&mut self, name: &ServerName, outcome: DeployOutcome) {
        if let Some(server) = self.servers.get_mut(name) {
            info!(server = %name, outcome = ?outcome, "Recorded deploy outcome");
            server.last_deploy = outcome;
        }
    }
}

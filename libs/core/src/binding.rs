//! Task → server bindings.
//!
//! Exclusive bindings own their server and appear in the server → task
//! reverse index. Soft assignments (the non-exclusive path) only record which
//! server a task was told to use; they never own it.
//!
//! Both kinds draw task IDs from the same sequence space, so two tasks sharing
//! a display name always get distinct IDs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use servsel_id::{IdError, ItemId, ServerName, TaskId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("invalid task name: {0}")]
    InvalidTaskName(#[from] IdError),

    #[error("server {server} is already bound to {holder}")]
    ServerTaken { server: ServerName, holder: TaskId },
}

/// A task's association with a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub task_id: TaskId,
    pub display_name: String,
    pub server: ServerName,
    pub should_deploy: bool,

    /// Queue item that produced the binding, if known.
    pub item: Option<ItemId>,

    /// The task left the queue and began executing.
    pub started: bool,

    /// `false` for soft assignments.
    pub exclusive: bool,

    pub bound_at: DateTime<Utc>,

    /// Consecutive reconciliation passes where a soft assignment's task was
    /// not found. Exclusive bindings count on the server instead.
    #[serde(skip)]
    pub(crate) misses: u32,

    /// Unique per table insert. Task IDs are reused once released, so this
    /// tells a rebinding apart from the binding it replaced.
    #[serde(skip)]
    pub(crate) generation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: HashMap<TaskId, Binding>,
    by_server: HashMap<ServerName, TaskId>,
    soft: HashMap<TaskId, Binding>,
    generations: u64,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest sequence number not held by any live binding or soft
    /// assignment with the same display name.
    pub fn next_task_id(&self, display_name: &str) -> Result<TaskId, BindError> {
        let base = TaskId::base_for(display_name);
        let taken = |seq: u32| {
            self.bindings
                .keys()
                .chain(self.soft.keys())
                .any(|id| id.seq() == seq && id.base() == base)
        };

        let mut seq = 1;
        while taken(seq) {
            seq += 1;
        }
        Ok(TaskId::new(display_name, seq)?)
    }

    /// Records an exclusive binding. Fails if the server is already bound.
    pub fn bind(
        &mut self,
        display_name: &str,
        server: &ServerName,
        should_deploy: bool,
        item: Option<ItemId>,
    ) -> Result<TaskId, BindError> {
        if let Some(holder) = self.by_server.get(server) {
            return Err(BindError::ServerTaken {
                server: server.clone(),
                holder: holder.clone(),
            });
        }

        let task_id = self.next_task_id(display_name)?;
        let binding = Binding {
            task_id: task_id.clone(),
            display_name: display_name.to_string(),
            server: server.clone(),
            should_deploy,
            item,
            started: false,
            exclusive: true,
            bound_at: Utc::now(),
            misses: 0,
            generation: self.next_generation(),
        };

        self.by_server.insert(server.clone(), task_id.clone());
        self.bindings.insert(task_id.clone(), binding);
        Ok(task_id)
    }

    /// Records a non-exclusive assignment.
    pub fn assign_soft(
        &mut self,
        display_name: &str,
        server: &ServerName,
        should_deploy: bool,
        item: Option<ItemId>,
    ) -> Result<TaskId, BindError> {
        let task_id = self.next_task_id(display_name)?;
        let binding = Binding {
            task_id: task_id.clone(),
            display_name: display_name.to_string(),
            server: server.clone(),
            should_deploy,
            item,
            started: false,
            exclusive: false,
            bound_at: Utc::now(),
            misses: 0,
            generation: self.next_generation(),
        };

        self.soft.insert(task_id.clone(), binding);
        Ok(task_id)
    }

    fn next_generation(&mut self) -> u64 {
        self.generations += 1;
        self.generations
    }

    /// Exclusive binding for a task.
    pub fn lookup(&self, task_id: &TaskId) -> Option<&Binding> {
        self.bindings.get(task_id)
    }

    /// Task holding a server exclusively.
    pub fn reverse_lookup(&self, server: &ServerName) -> Option<&TaskId> {
        self.by_server.get(server)
    }

    /// Exclusive binding or soft assignment for a task.
    pub fn resolve(&self, task_id: &TaskId) -> Option<&Binding> {
        self.bindings
            .get(task_id)
            .or_else(|| self.soft.get(task_id))
    }

    pub fn release(&mut self, task_id: &TaskId) -> Option<Binding> {
        let binding = self.bindings.remove(task_id)?;
        if self.by_server.get(&binding.server) == Some(task_id) {
            self.by_server.remove(&binding.server);
        }
        Some(binding)
    }

    pub fn release_by_server(&mut self, server: &ServerName) -> Option<Binding> {
        let task_id = self.by_server.remove(server)?;
        self.bindings.remove(&task_id)
    }

    pub fn remove_soft(&mut self, task_id: &TaskId) -> Option<Binding> {
        self.soft.remove(task_id)
    }

    pub(crate) fn soft_mut(&mut self, task_id: &TaskId) -> Option<&mut Binding> {
        self.soft.get_mut(task_id)
    }

    /// Soft assignments currently pointing at a server.
    pub fn soft_holders(&self, server: &ServerName) -> Vec<&TaskId> {
        self.soft
            .values()
            .filter(|b| &b.server == server)
            .map(|b| &b.task_id)
            .collect()
    }

    /// Flags a binding or soft assignment as started.
    pub fn mark_started(&mut self, task_id: &TaskId) -> Option<&Binding> {
        let binding = match self.bindings.get_mut(task_id) {
            Some(binding) => binding,
            None => self.soft.get_mut(task_id)?,
        };
        binding.started = true;
        Some(binding)
    }

    /// Exclusive bindings.
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    pub fn soft_assignments(&self) -> impl Iterator<Item = &Binding> {
        self.soft.values()
    }

    /// Number of exclusive bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

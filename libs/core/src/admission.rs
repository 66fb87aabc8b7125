//! Admission request and result types.

use serde::{Deserialize, Serialize};
use servsel_id::{CategoryName, ItemId, ServerName, TaskId};

use crate::policy::{DeployContext, SelectError, Target};

/// Shape of the queued task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Standalone,
    /// Container for matrix children; never bound itself.
    MatrixParent,
    MatrixChild,
}

/// A request from the scheduler to admit one queued item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub item: ItemId,
    pub display_name: String,

    #[serde(default)]
    pub kind: TaskKind,

    /// Whether server selection is enabled for the task.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub category: Option<CategoryName>,

    #[serde(default)]
    pub target: Target,

    #[serde(default)]
    pub deploy: Option<DeployContext>,

    /// `false` takes the non-exclusive path: the task is told which server
    /// to use but the server is not locked.
    #[serde(default = "default_true")]
    pub exclusive: bool,
}

fn default_true() -> bool {
    true
}

impl AdmissionRequest {
    pub fn new(item: ItemId, display_name: impl Into<String>) -> Self {
        Self {
            item,
            display_name: display_name.into(),
            kind: TaskKind::Standalone,
            enabled: true,
            category: None,
            target: Target::FirstAvailable,
            deploy: None,
            exclusive: true,
        }
    }

    pub fn with_category(mut self, category: CategoryName) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_deploy(mut self, deploy: DeployContext) -> Self {
        self.deploy = Some(deploy);
        self
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn non_exclusive(mut self) -> Self {
        self.exclusive = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A granted admission. Returned unchanged on repeated checks for the same
/// queue item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    pub task_id: TaskId,
    pub server: ServerName,
    pub should_deploy: bool,
    pub exclusive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotApplicableReason {
    Disabled,
    MatrixParent,
    NoCategory,
}

/// Why an item cannot run yet. Blocked items are retried on the scheduler's
/// next pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    NoFreeServer {
        category: CategoryName,
    },
    SpecificServerBusy {
        server: ServerName,
        holder: Option<TaskId>,
    },
    UnknownServer {
        name: String,
    },
    Vetoed {
        voter: String,
        message: String,
    },
    NoPlacement,
    /// The request cannot be turned into a task ID.
    InvalidTask {
        message: String,
    },
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFreeServer { category } => {
                write!(f, "no free server in category {category}")
            }
            Self::SpecificServerBusy {
                server,
                holder: Some(holder),
            } => write!(f, "server already selected: {server} is in use by {holder}"),
            Self::SpecificServerBusy {
                server,
                holder: None,
            } => write!(f, "server already selected: {server} is in use"),
            Self::UnknownServer { name } => write!(f, "unknown server {name}"),
            Self::Vetoed { voter, message } => write!(f, "blocked by {voter}: {message}"),
            Self::NoPlacement => f.write_str("no executor can take the task"),
            Self::InvalidTask { message } => write!(f, "invalid task: {message}"),
        }
    }
}

impl From<SelectError> for BlockReason {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::NoFreeServer { category } => Self::NoFreeServer { category },
            SelectError::UnknownServer { name } => Self::UnknownServer { name },
            SelectError::ServerBusy { server, holder } => {
                Self::SpecificServerBusy { server, holder }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdmitResult {
    Admitted(Admission),
    NotApplicable { reason: NotApplicableReason },
    Blocked(BlockReason),
}

impl AdmitResult {
    pub fn admission(&self) -> Option<&Admission> {
        match self {
            Self::Admitted(admission) => Some(admission),
            _ => None,
        }
    }

    /// Whether the scheduler may start the item now.
    pub fn can_run(&self) -> bool {
        !matches!(self, Self::Blocked(_))
    }
}

/// What a task learns when it starts executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedTask {
    pub task_id: TaskId,
    pub server: ServerName,
    pub should_deploy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Released { server: ServerName },
    SoftDropped { server: ServerName },
    NotBound,
}

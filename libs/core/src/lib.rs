//! Server allocation engine.
//!
//! Gates admission of queued build tasks onto a pool of named servers. Each
//! server belongs to a category and runs at most one bound task at a time.
//!
//! ## Architecture
//!
//! ```text
//! scheduler ──► Allocator::try_admit ──► policy::select_server ──► ServerRegistry
//!                     │                                                ▲
//!                     └──────────► BindingTable ◄── release / reclaim ─┘
//! ```
//!
//! - **Registry**: known servers and their live state, refreshed from inventory
//! - **Policy**: picks a free server for a category or checks a specific one
//! - **Bindings**: task → server associations with a server → task reverse index
//! - **Release & reclamation**: lifecycle hooks and the stuck-server sweep
//! - **Gateway**: [`Allocator`], the single entry point guarded by one lock
//!
//! ## Invariants
//!
//! - A server is `busy` iff exactly one live binding references it
//! - Repeated admission checks for the same queue item never allocate twice
//! - No lock is held across collaborator calls (voters, probes, inventory I/O)

pub mod admission;
pub mod allocator;
pub mod binding;
pub mod collaborators;
pub mod environment;
pub mod inventory;
pub mod policy;
pub mod reconcile;
pub mod registry;
pub mod server;

pub use admission::{
    AdmissionRequest, Admission, AdmitResult, BlockReason, NotApplicableReason, ReleaseOutcome,
    StartedTask, TaskKind,
};
pub use allocator::{Allocator, AllocatorConfig, ResolvedTask};
pub use binding::{BindError, Binding, BindingTable};
pub use collaborators::{
    AdmissionVoter, MockScheduler, PlacementProbe, ProbeError, SchedulerProbe,
};
pub use environment::{build_environment, yaml_target, BuildEnvRules};
pub use inventory::{
    parse_environment_line, parse_inventory_line, EnvironmentCatalog, EnvironmentInfo,
    InventoryError, InventoryReport, InventorySnapshot, ServerSnapshot,
};
pub use policy::{
    select_server, DeployContext, DeployTarget, SelectError, Selection, Target, VersionReq,
};
pub use reconcile::ReconcileStats;
pub use registry::ServerRegistry;
pub use server::{DeployOutcome, Server};

pub use servsel_id::{CategoryName, IdError, ItemId, ServerName, TaskId};

//! Server selection service.
//!
//! Wraps the allocation engine in a long-running process:
//! - HTTP API for the scheduler and build lifecycle notifications
//! - Periodic inventory refresh from a command or snapshot file
//! - Periodic reclamation of servers whose tasks vanished

pub mod api;
pub mod config;
pub mod inventory;
pub mod probe;
pub mod state;
pub mod worker;

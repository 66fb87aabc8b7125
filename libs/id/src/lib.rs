//! # servsel-id
//!
//! Typed names and identifiers used by the server-selection allocator.
//!
//! ## Design Principles
//!
//! - Server and category names are operator/inventory-controlled labels
//! - Queue item IDs are opaque integers handed to us by the scheduler
//! - Task IDs are derived from a task's display name plus a sequence number
//! - Every type has a canonical string form with strict parsing
//!
//! ## Task ID Format
//!
//! `{display_name}_num_{seq}` where spaces in the display name are replaced
//! by underscores and `seq` starts at 1.
//!
//! Examples:
//! - `nightly_#42_num_1`
//! - `DeploySingleServer_#7_num_2`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

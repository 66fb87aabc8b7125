//! Inventory snapshots and the fleet tool's line format.
//!
//! The inventory refresher periodically reports every server it knows about,
//! together with the deployment environments and their latest versions.
//! Server lines look like:
//!
//! ```text
//! name,environment[,version[,tag...]]
//! ```
//!
//! The category of a server is the first configured category found among its
//! tags; the `in_use` tag marks a server as externally occupied.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use servsel_id::{CategoryName, IdError, ServerName};
use thiserror::Error;

/// Tag marking a server as occupied outside this allocator.
pub const IN_USE_TAG: &str = "in_use";

/// Version keyword resolved against the environment catalog.
pub const LATEST_VERSION: &str = "latest";

/// Errors from parsing inventory data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("inventory line has too few fields: '{0}'")]
    TooFewFields(String),

    #[error("invalid server name in inventory line '{line}': {source}")]
    InvalidName {
        line: String,
        #[source]
        source: IdError,
    },
}

/// One server as reported by inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub name: ServerName,
    #[serde(default)]
    pub category: Option<CategoryName>,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub in_use: bool,
}

/// A deployment environment and the latest version available for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub name: String,
    #[serde(default)]
    pub latest_version: Option<String>,
}

/// A full inventory cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub servers: Vec<ServerSnapshot>,

    /// `None` leaves the environment catalog untouched.
    #[serde(default)]
    pub environments: Option<Vec<EnvironmentInfo>>,
}

/// Result of applying an inventory snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventoryReport {
    pub added: usize,
    pub updated: usize,
    pub removed: Vec<ServerName>,

    /// Removed servers that were still bound and had to be force-released.
    pub force_released: Vec<ServerName>,
}

/// Parses one server line.
pub fn parse_inventory_line(
    line: &str,
    categories: &[CategoryName],
) -> Result<ServerSnapshot, InventoryError> {
    let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
    if fields.len() < 2 {
        return Err(InventoryError::TooFewFields(line.to_string()));
    }

    let name = ServerName::parse(fields[0]).map_err(|source| InventoryError::InvalidName {
        line: line.to_string(),
        source,
    })?;
    let environment = fields[1].to_string();
    let version = fields.get(2).map(|v| v.to_string()).unwrap_or_default();
    let tags = fields.get(3..).unwrap_or_default();

    let category = categories
        .iter()
        .find(|c| tags.contains(&c.as_str()))
        .cloned();
    let in_use = tags.contains(&IN_USE_TAG);

    Ok(ServerSnapshot {
        name,
        category,
        environment,
        version,
        in_use,
    })
}

/// Parses one environment line (`name[,latest_version]`).
///
/// Returns `None` for blank lines and for environments whose name starts with
/// `_` (internal environments are never offered).
pub fn parse_environment_line(line: &str) -> Option<EnvironmentInfo> {
    let mut fields = line.trim().splitn(2, ',').map(str::trim);
    let name = fields.next().filter(|n| !n.is_empty() && !n.starts_with('_'))?;
    let latest_version = fields
        .next()
        .filter(|v| !v.is_empty() && *v != "unknown")
        .map(str::to_string);

    Some(EnvironmentInfo {
        name: name.to_string(),
        latest_version,
    })
}

/// Known deployment environments and the latest version of each.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentCatalog {
    environments: Vec<String>,
    latest: HashMap<String, String>,
}

impl EnvironmentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the catalog with a new environment list.
    pub fn apply(&mut self, environments: &[EnvironmentInfo]) {
        self.environments = environments
            .iter()
            .filter(|e| !e.name.starts_with('_'))
            .map(|e| e.name.clone())
            .collect();
        self.latest = environments
            .iter()
            .filter_map(|e| {
                e.latest_version
                    .as_ref()
                    .map(|v| (e.name.clone(), v.clone()))
            })
            .collect();
    }

    pub fn environments(&self) -> &[String] {
        &self.environments
    }

    pub fn latest(&self, environment: &str) -> Option<&str> {
        self.latest.get(environment).map(String::as_str)
    }

    /// Resolves a requested version, expanding `latest`.
    ///
    /// Returns `None` when `latest` is requested but unknown for the
    /// environment.
    pub fn resolve_version(&self, environment: &str, version: &str) -> Option<String> {
        if version.eq_ignore_ascii_case(LATEST_VERSION) {
            self.latest(environment).map(str::to_string)
        } else {
            Some(version.to_string())
        }
    }
}

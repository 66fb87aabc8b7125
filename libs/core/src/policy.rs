//! Server selection policy.
//!
//! Decides which server satisfies a request:
//! - **First available**: first free server of the category in registry
//!   order, preferring one that already runs the requested deployment
//! - **Specific**: the named server, as long as it is registered,
//!   categorised and not bound (`in_use` is ignored: operator intent wins)

use serde::{Deserialize, Serialize};
use servsel_id::{CategoryName, IdError, ServerName, TaskId};
use thiserror::Error;

use crate::binding::BindingTable;
use crate::inventory::EnvironmentCatalog;
use crate::registry::ServerRegistry;
use crate::server::Server;

/// Sentinel parameter value requesting any free server of the category.
pub const FIRST_AVAILABLE: &str = "First Available Server";

/// Which server a task asks for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    FirstAvailable,
    Specific(ServerName),
}

impl Target {
    /// Interprets a task's target parameter. Empty values and the
    /// first-available sentinel both mean [`Target::FirstAvailable`].
    pub fn from_parameter(value: Option<&str>) -> Result<Self, IdError> {
        match value.map(str::trim) {
            None | Some("") | Some(FIRST_AVAILABLE) => Ok(Self::FirstAvailable),
            Some(name) => ServerName::parse(name).map(Self::Specific),
        }
    }

    pub fn as_parameter(&self) -> &str {
        match self {
            Self::FirstAvailable => FIRST_AVAILABLE,
            Self::Specific(name) => name.as_str(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_parameter())
    }
}

impl Serialize for Target {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_parameter())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Self::from_parameter(value.as_deref()).map_err(serde::de::Error::custom)
    }
}

/// Deployment a task intends to run against, as requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployContext {
    #[serde(default)]
    pub environment: Option<String>,

    /// A concrete version or `latest`.
    #[serde(default)]
    pub version: Option<String>,
}

impl DeployContext {
    pub fn new(environment: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            environment: Some(environment.into()),
            version: Some(version.into()),
        }
    }

    /// Resolves the context against the environment catalog.
    ///
    /// Without an environment there is nothing to match. A `latest` version
    /// the catalog cannot resolve becomes [`VersionReq::Unresolvable`].
    pub fn resolve(&self, catalog: &EnvironmentCatalog) -> Option<DeployTarget> {
        let environment = self
            .environment
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())?;

        let version = match self.version.as_deref().map(str::trim) {
            None | Some("") => VersionReq::Any,
            Some(version) => catalog
                .resolve_version(environment, version)
                .map_or(VersionReq::Unresolvable, VersionReq::Exact),
        };

        Some(DeployTarget {
            environment: environment.to_string(),
            version,
        })
    }
}

/// Version a deploy target asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionReq {
    /// No version given; the environment alone decides.
    Any,
    Exact(String),
    /// `latest` for an environment the catalog does not know. No server
    /// matches, so the pick always redeploys.
    Unresolvable,
}

/// A resolved deployment target used for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub environment: String,
    pub version: VersionReq,
}

/// A successful pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub server: ServerName,
    pub should_deploy: bool,
}

/// Why no server could be selected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("no free server in category {category}")]
    NoFreeServer { category: CategoryName },

    #[error("unknown server {name}")]
    UnknownServer { name: String },

    #[error("server {server} is busy")]
    ServerBusy {
        server: ServerName,
        holder: Option<TaskId>,
    },
}

/// Selects a server for a request.
pub fn select_server(
    registry: &ServerRegistry,
    bindings: &BindingTable,
    category: &CategoryName,
    target: &Target,
    deploy: Option<&DeployTarget>,
) -> Result<Selection, SelectError> {
    match target {
        Target::FirstAvailable => first_available(registry, category, deploy),
        Target::Specific(name) => specific(registry, bindings, name, deploy),
    }
}

/// First free server of a category, preferring one that needs no redeploy.
pub fn first_available(
    registry: &ServerRegistry,
    category: &CategoryName,
    deploy: Option<&DeployTarget>,
) -> Result<Selection, SelectError> {
    let mut fallback: Option<&Server> = None;

    for server in registry.list_by_category(category).filter(|s| s.is_free()) {
        match deploy {
            Some(target) if server.satisfies(target) => {
                return Ok(Selection {
                    server: server.name.clone(),
                    should_deploy: false,
                });
            }
            Some(_) => {
                if fallback.is_none() {
                    fallback = Some(server);
                }
            }
            None => {
                return Ok(Selection {
                    server: server.name.clone(),
                    should_deploy: false,
                });
            }
        }
    }

    fallback
        .map(|server| Selection {
            server: server.name.clone(),
            should_deploy: true,
        })
        .ok_or_else(|| SelectError::NoFreeServer {
            category: category.clone(),
        })
}

/// The named server, if it is registered, categorised and unbound.
pub fn specific(
    registry: &ServerRegistry,
    bindings: &BindingTable,
    name: &ServerName,
    deploy: Option<&DeployTarget>,
) -> Result<Selection, SelectError> {
    let server = registry
        .get(name)
        .filter(|s| s.category.is_some())
        .ok_or_else(|| SelectError::UnknownServer {
            name: name.to_string(),
        })?;

    if server.busy {
        return Err(SelectError::ServerBusy {
            server: name.clone(),
            holder: bindings.reverse_lookup(name).cloned(),
        });
    }

    Ok(Selection {
        server: server.name.clone(),
        should_deploy: server.needs_deploy(deploy),
    })
}

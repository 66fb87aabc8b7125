//! Target server state.

use serde::{Deserialize, Serialize};
use servsel_id::{CategoryName, ServerName, TaskId};

use crate::inventory::ServerSnapshot;
use crate::policy::{DeployTarget, VersionReq};

/// Outcome of the last deploy task that ran against a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployOutcome {
    /// No deploy has been observed since the server appeared.
    #[default]
    Unknown,
    /// The last deploy succeeded.
    Passed,
    /// The last deploy failed or was aborted.
    Failed,
}

impl DeployOutcome {
    /// Maps a task result onto a deploy outcome.
    pub fn from_success(succeeded: bool) -> Self {
        if succeeded {
            Self::Passed
        } else {
            Self::Failed
        }
    }
}

/// A named execution target.
///
/// Inventory owns `category`, `environment`, `version` and `in_use`; the
/// allocator owns `busy`, `bound_task`, `stuck_counter` and `last_deploy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub name: ServerName,

    /// `None` when inventory reported none of the configured categories.
    pub category: Option<CategoryName>,

    pub environment: String,
    pub version: String,

    /// Bound to exactly one task by this allocator.
    pub busy: bool,

    /// Reported as occupied by inventory, independent of our bookkeeping.
    pub in_use: bool,

    pub last_deploy: DeployOutcome,
    pub bound_task: Option<TaskId>,

    /// Consecutive reconciliation passes where the bound task was not found.
    pub stuck_counter: u32,

    #[serde(skip)]
    pub(crate) seen: bool,
}

impl Server {
    /// Creates a fresh, unbound server from an inventory snapshot.
    pub fn from_snapshot(snapshot: &ServerSnapshot) -> Self {
        Self {
            name: snapshot.name.clone(),
            category: snapshot.category.clone(),
            environment: snapshot.environment.clone(),
            version: snapshot.version.clone(),
            busy: false,
            in_use: snapshot.in_use,
            last_deploy: DeployOutcome::Unknown,
            bound_task: None,
            stuck_counter: 0,
            seen: false,
        }
    }

    /// Free for first-available selection.
    pub fn is_free(&self) -> bool {
        !self.busy && !self.in_use
    }

    pub fn in_category(&self, category: &CategoryName) -> bool {
        self.category.as_ref() == Some(category)
    }

    /// Whether the server already runs the requested environment/version and
    /// its last deploy passed, so no redeploy is needed before use.
    pub fn satisfies(&self, target: &DeployTarget) -> bool {
        if self.last_deploy != DeployOutcome::Passed || self.environment != target.environment {
            return false;
        }
        match &target.version {
            VersionReq::Any => true,
            VersionReq::Exact(version) => &self.version == version,
            VersionReq::Unresolvable => false,
        }
    }

    /// Whether a task bound to this server should redeploy first.
    pub fn needs_deploy(&self, target: Option<&DeployTarget>) -> bool {
        target.is_some_and(|t| !self.satisfies(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(environment: &str, version: &str, last_deploy: DeployOutcome) -> Server {
        let snapshot = ServerSnapshot {
            name: "b1.example.net".parse().unwrap(),
            category: Some("build".parse().unwrap()),
            environment: environment.to_string(),
            version: version.to_string(),
            in_use: false,
        };
        let mut server = Server::from_snapshot(&snapshot);
        server.last_deploy = last_deploy;
        server
    }

    fn target(environment: &str, version: Option<&str>) -> DeployTarget {
        DeployTarget {
            environment: environment.to_string(),
            version: version.map_or(VersionReq::Any, |v| VersionReq::Exact(v.to_string())),
        }
    }

    #[test]
    fn test_fresh_server_is_unbound() {
        let s = server("qa", "1.0", DeployOutcome::Unknown);
        assert!(s.is_free());
        assert!(s.bound_task.is_none());
        assert_eq!(s.stuck_counter, 0);
    }

    #[test]
    fn test_satisfies_requires_passed_deploy() {
        let unknown = server("qa", "1.0", DeployOutcome::Unknown);
        let passed = server("qa", "1.0", DeployOutcome::Passed);
        let failed = server("qa", "1.0", DeployOutcome::Failed);

        let t = target("qa", Some("1.0"));
        assert!(!unknown.satisfies(&t));
        assert!(passed.satisfies(&t));
        assert!(!failed.satisfies(&t));
    }

    #[test]
    fn test_satisfies_version_optional() {
        let s = server("qa", "1.0", DeployOutcome::Passed);
        assert!(s.satisfies(&target("qa", None)));
        assert!(!s.satisfies(&target("qa", Some("2.0"))));
        assert!(!s.satisfies(&target("prod", None)));
    }

    #[test]
    fn test_unresolvable_version_never_satisfied() {
        let s = server("qa", "1.0", DeployOutcome::Passed);
        let t = DeployTarget {
            environment: "qa".to_string(),
            version: VersionReq::Unresolvable,
        };
        assert!(!s.satisfies(&t));
        assert!(s.needs_deploy(Some(&t)));
    }

    #[test]
    fn test_needs_deploy_without_target() {
        let s = server("qa", "1.0", DeployOutcome::Failed);
        assert!(!s.needs_deploy(None));
        assert!(s.needs_deploy(Some(&target("qa", Some("1.0")))));
    }
}

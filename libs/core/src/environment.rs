//! Variables injected into a running task.

use std::collections::{BTreeMap, HashMap};

use servsel_id::CategoryName;

use crate::server::Server;

pub const TARGET_VAR: &str = "TARGET";
pub const YAML_TARGET_VAR: &str = "YAML_TARGET";
pub const DEPLOY_VAR: &str = "DEPLOY";
pub const BRANCH_VAR: &str = "BRANCH_FOR_ENVIRONMENT";

#[derive(Debug, Clone)]
pub struct BuildEnvRules {
    /// Categories whose YAML target gets a `_cluster` suffix.
    pub cluster_categories: Vec<CategoryName>,

    /// Environment name → source branch.
    pub branches: HashMap<String, String>,

    pub default_branch: String,
}

impl Default for BuildEnvRules {
    fn default() -> Self {
        Self {
            cluster_categories: Vec::new(),
            branches: HashMap::new(),
            default_branch: "master".to_string(),
        }
    }
}

impl BuildEnvRules {
    pub fn branch_for(&self, environment: &str) -> &str {
        self.branches
            .get(environment)
            .map(String::as_str)
            .unwrap_or(&self.default_branch)
    }
}

/// Short host name with the first letter upper-cased and the rest
/// lower-cased, e.g. `BUILD01.example.net` → `Build01`.
pub fn yaml_target(server: &str, cluster: bool) -> String {
    let short = server.split('.').next().unwrap_or(server);
    let mut chars = short.chars();
    let mut name: String = match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    };
    if cluster {
        name.push_str("_cluster");
    }
    name
}

/// Builds the environment for a task bound to `server`.
///
/// `environment` is the deployment environment the task targets; without one
/// the server's current environment is used to pick the branch.
pub fn build_environment(
    server: &Server,
    should_deploy: bool,
    environment: Option<&str>,
    rules: &BuildEnvRules,
) -> BTreeMap<String, String> {
    let cluster = server
        .category
        .as_ref()
        .is_some_and(|c| rules.cluster_categories.contains(c));
    let environment = environment.unwrap_or(&server.environment);

    BTreeMap::from([
        (TARGET_VAR.to_string(), server.name.to_string()),
        (
            YAML_TARGET_VAR.to_string(),
            yaml_target(server.name.as_str(), cluster),
        ),
        (DEPLOY_VAR.to_string(), should_deploy.to_string()),
        (
            BRANCH_VAR.to_string(),
            rules.branch_for(environment).to_string(),
        ),
    ])
}

//! Selector configuration (env-driven).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use servsel_core::allocator::DEFAULT_DEPLOY_MARKERS;
use servsel_core::{AllocatorConfig, BuildEnvRules, CategoryName};

/// Where periodic inventory comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventorySourceConfig {
    /// Run commands and parse their output lines.
    Command {
        servers: String,
        environments: Option<String>,
    },
    /// Read a JSON snapshot file.
    File(PathBuf),
    /// Inventory is only pushed through the API.
    Push,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Categories recognised in inventory tags, in priority order.
    pub categories: Vec<CategoryName>,

    pub cluster_categories: Vec<CategoryName>,

    /// Environment → branch overrides for `BRANCH_FOR_ENVIRONMENT`.
    pub branches: HashMap<String, String>,

    pub deploy_markers: Vec<String>,

    pub stuck_threshold: u32,
    pub reconcile_interval: Duration,
    pub inventory_interval: Duration,

    pub inventory_source: InventorySourceConfig,

    /// Base URL of the scheduler's HTTP API. Reconciliation is disabled
    /// without it.
    pub scheduler_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr = var("SERVSEL_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("SERVSEL_LISTEN_ADDR must be a socket address.")?;

        let log_level = var("SERVSEL_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let categories = parse_categories(var("SERVSEL_CATEGORIES").as_deref())
            .context("Invalid SERVSEL_CATEGORIES.")?;
        let cluster_categories = parse_categories(var("SERVSEL_CLUSTER_CATEGORIES").as_deref())
            .context("Invalid SERVSEL_CLUSTER_CATEGORIES.")?;

        let branches = parse_branches(var("SERVSEL_BRANCHES").as_deref())?;

        let deploy_markers = match var("SERVSEL_DEPLOY_MARKERS") {
            Some(raw) => split_list(&raw).map(str::to_string).collect(),
            None => DEFAULT_DEPLOY_MARKERS.iter().map(|m| m.to_string()).collect(),
        };

        let stuck_threshold = parse_number::<u32>(&var, "SERVSEL_STUCK_THRESHOLD")?
            .unwrap_or(2)
            .max(1);

        let reconcile_interval = Duration::from_secs(
            parse_number::<u64>(&var, "SERVSEL_RECONCILE_INTERVAL_SECS")?
                .unwrap_or(60)
                .max(1),
        );
        let inventory_interval = Duration::from_secs(
            parse_number::<u64>(&var, "SERVSEL_INVENTORY_INTERVAL_SECS")?
                .unwrap_or(60)
                .max(1),
        );

        let inventory_source = match (
            var("SERVSEL_INVENTORY_COMMAND").filter(|v| !v.trim().is_empty()),
            var("SERVSEL_INVENTORY_FILE").filter(|v| !v.trim().is_empty()),
        ) {
            (Some(_), Some(_)) => anyhow::bail!(
                "Set at most one of SERVSEL_INVENTORY_COMMAND and SERVSEL_INVENTORY_FILE."
            ),
            (Some(servers), None) => InventorySourceConfig::Command {
                servers,
                environments: var("SERVSEL_ENVIRONMENTS_COMMAND").filter(|v| !v.trim().is_empty()),
            },
            (None, Some(path)) => InventorySourceConfig::File(PathBuf::from(path)),
            (None, None) => InventorySourceConfig::Push,
        };

        let scheduler_url = var("SERVSEL_SCHEDULER_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty());

        Ok(Self {
            listen_addr,
            log_level,
            categories,
            cluster_categories,
            branches,
            deploy_markers,
            stuck_threshold,
            reconcile_interval,
            inventory_interval,
            inventory_source,
            scheduler_url,
        })
    }

    pub fn allocator(&self) -> AllocatorConfig {
        AllocatorConfig {
            stuck_threshold: self.stuck_threshold,
            deploy_markers: self.deploy_markers.clone(),
        }
    }

    pub fn build_env_rules(&self) -> BuildEnvRules {
        BuildEnvRules {
            cluster_categories: self.cluster_categories.clone(),
            branches: self.branches.clone(),
            ..Default::default()
        }
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_categories(raw: Option<&str>) -> Result<Vec<CategoryName>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    split_list(raw)
        .map(|c| CategoryName::parse(c).with_context(|| format!("invalid category '{c}'")))
        .collect()
}

fn parse_branches(raw: Option<&str>) -> Result<HashMap<String, String>> {
    let Some(raw) = raw else {
        return Ok(HashMap::new());
    };
    split_list(raw)
        .map(|pair| -> Result<(String, String)> {
            let (env, branch) = pair
                .split_once('=')
                .with_context(|| format!("SERVSEL_BRANCHES entry '{pair}' must be env=branch."))?;
            Ok((env.trim().to_string(), branch.trim().to_string()))
        })
        .collect()
}

fn parse_number<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("{key} must be a non-negative integer."))
}

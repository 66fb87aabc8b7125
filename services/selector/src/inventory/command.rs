//! Inventory from a fleet command's output.

use async_trait::async_trait;
use servsel_core::{
    parse_environment_line, parse_inventory_line, CategoryName, InventorySnapshot,
};
use tokio::process::Command;
use tracing::debug;

use super::{InventorySource, SourceError};

/// Runs shell commands and parses their stdout.
///
/// The server command prints one `name,environment[,version[,tag...]]` line
/// per server; the optional environment command prints
/// `name[,latest_version]` lines.
pub struct CommandSource {
    command: String,
    environments_command: Option<String>,
    categories: Vec<CategoryName>,
}

impl CommandSource {
    pub fn new(
        command: impl Into<String>,
        environments_command: Option<String>,
        categories: Vec<CategoryName>,
    ) -> Self {
        Self {
            command: command.into(),
            environments_command,
            categories,
        }
    }
}

async fn run(command: &str) -> Result<String, SourceError> {
    debug!(command, "Running inventory command");
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(SourceError::Spawn)?;

    if !output.status.success() {
        return Err(SourceError::CommandFailed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8(output.stdout).map_err(|e| SourceError::Parse(e.to_string()))
}

fn data_lines(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

#[async_trait]
impl InventorySource for CommandSource {
    fn name(&self) -> &str {
        "command"
    }

    async fn fetch(&self) -> Result<InventorySnapshot, SourceError> {
        let output = run(&self.command).await?;
        let servers = data_lines(&output)
            .map(|line| parse_inventory_line(line, &self.categories))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let environments = match &self.environments_command {
            Some(command) => {
                let output = run(command).await?;
                Some(data_lines(&output).filter_map(parse_environment_line).collect())
            }
            None => None,
        };

        Ok(InventorySnapshot {
            servers,
            environments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories() -> Vec<CategoryName> {
        vec!["build".parse().unwrap()]
    }

    #[tokio::test]
    async fn test_fetch_parses_output() {
        let source = CommandSource::new(
            "printf '# fleet\\nb1.lab,qa,1.0,build\\n\\nb2.lab,qa,1.0,build,in_use\\n'",
            Some("printf 'qa,1.0\\n_internal,9\\n'".to_string()),
            categories(),
        );

        let snapshot = source.fetch().await.unwrap();
        assert_eq!(snapshot.servers.len(), 2);
        assert!(snapshot.servers[1].in_use);

        let environments = snapshot.environments.unwrap();
        assert_eq!(environments.len(), 1);
        assert_eq!(environments[0].latest_version.as_deref(), Some("1.0"));
    }

    #[tokio::test]
    async fn test_bad_line_fails_whole_fetch() {
        let source = CommandSource::new("echo lonely", None, categories());
        assert!(matches!(
            source.fetch().await.unwrap_err(),
            SourceError::Parse(_)
        ));
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let source = CommandSource::new("echo nope >&2; exit 3", None, categories());
        match source.fetch().await.unwrap_err() {
            SourceError::CommandFailed { stderr, .. } => assert_eq!(stderr, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }
}

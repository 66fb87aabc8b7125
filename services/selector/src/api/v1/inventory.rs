//! Inventory push feed.
//!
//! Accepts either structured snapshots or raw fleet-tool lines; raw lines are
//! classified with the configured categories.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use servsel_core::{
    parse_environment_line, parse_inventory_line, EnvironmentInfo, InventoryReport,
    InventorySnapshot, ServerSnapshot,
};

use crate::api::error::ApiError;
use crate::state::AppState;

/// /v1/inventory
pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(push_inventory))
}

#[derive(Debug, Default, Deserialize)]
pub struct InventoryPush {
    #[serde(default)]
    pub servers: Vec<ServerSnapshot>,

    /// Raw `name,environment[,version[,tag...]]` lines.
    #[serde(default)]
    pub lines: Vec<String>,

    #[serde(default)]
    pub environments: Option<Vec<EnvironmentInfo>>,

    /// Raw `name[,latest_version]` lines.
    #[serde(default)]
    pub environment_lines: Option<Vec<String>>,
}

impl InventoryPush {
    fn into_snapshot(self, state: &AppState) -> Result<InventorySnapshot, ApiError> {
        let mut servers = self.servers;
        for line in self.lines.iter().filter(|l| !l.trim().is_empty()) {
            let snapshot = parse_inventory_line(line, state.categories())
                .map_err(|e| ApiError::unprocessable("invalid_inventory_line", e.to_string()))?;
            servers.push(snapshot);
        }

        let environments = match (self.environments, self.environment_lines) {
            (None, None) => None,
            (structured, lines) => {
                let mut environments = structured.unwrap_or_default();
                environments.extend(
                    lines
                        .unwrap_or_default()
                        .iter()
                        .filter_map(|l| parse_environment_line(l)),
                );
                Some(environments)
            }
        };

        Ok(InventorySnapshot {
            servers,
            environments,
        })
    }
}

async fn push_inventory(
    State(state): State<AppState>,
    Json(push): Json<InventoryPush>,
) -> Result<Json<InventoryReport>, ApiError> {
    let snapshot = push.into_snapshot(&state)?;
    Ok(Json(state.allocator().apply_inventory(&snapshot).await))
}

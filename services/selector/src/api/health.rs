//! Health check endpoints.
//!
//! Used by load balancers and orchestration to decide whether the selector
//! is alive and has a server inventory to allocate from.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status: "ok" or "degraded".
    pub status: String,

    /// Service name.
    pub service: String,

    /// Service version.
    pub version: String,

    /// Current timestamp (RFC 3339).
    pub timestamp: String,

    /// Registered server count (readiness only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers: Option<usize>,
}

/// Create health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}

/// Liveness: the process is serving requests.
async fn healthz() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "server-selector".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        servers: None,
    })
}

/// Readiness: at least one inventory cycle has registered servers.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let servers = state.allocator().servers().await.len();
    let ready = servers > 0;

    let response = HealthResponse {
        status: if ready { "ok" } else { "degraded" }.to_string(),
        service: "server-selector".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        servers: Some(servers),
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_healthz_returns_ok() {
        let response = healthz().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

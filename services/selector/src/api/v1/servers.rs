//! Read-only views of the registry.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use servsel_core::{CategoryName, Server, ServerName};

use crate::api::error::ApiError;
use crate::state::AppState;

/// /v1/servers
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_servers))
        .route("/{name}", get(get_server))
}

/// /v1/categories
pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories))
        .route("/{category}/servers", get(list_category_servers))
}

#[derive(Debug, Serialize)]
pub struct ListServersResponse {
    pub items: Vec<Server>,
}

#[derive(Debug, Serialize)]
pub struct ListCategoriesResponse {
    pub items: Vec<CategoryName>,
}

async fn list_servers(State(state): State<AppState>) -> Json<ListServersResponse> {
    Json(ListServersResponse {
        items: state.allocator().servers().await,
    })
}

async fn get_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Server>, ApiError> {
    let name = ServerName::parse(&name)?;
    state
        .allocator()
        .server(&name)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("server_not_found", format!("unknown server {name}")))
}

async fn list_categories(State(state): State<AppState>) -> Json<ListCategoriesResponse> {
    Json(ListCategoriesResponse {
        items: state.allocator().categories().await,
    })
}

async fn list_category_servers(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<ListServersResponse>, ApiError> {
    let category = CategoryName::parse(&category)?;
    Ok(Json(ListServersResponse {
        items: state.allocator().servers_in_category(&category).await,
    }))
}

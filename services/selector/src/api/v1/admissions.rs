//! Admission endpoints called by the scheduler.
//!
//! The scheduler asks on every queue pass whether an item may run; blocked
//! and not-applicable answers are regular `200` responses carrying the
//! reason, since the item simply stays queued.

use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Json, Router,
};
use servsel_core::{AdmissionRequest, AdmitResult, ItemId, ReleaseOutcome, StartedTask};
use tracing::debug;

use crate::api::error::ApiError;
use crate::state::AppState;

/// /v1/admissions
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(admit))
        .route("/{item_id}", delete(forget))
}

/// /v1/items
pub fn item_routes() -> Router<AppState> {
    Router::new().route("/{item_id}/start", post(start))
}

async fn admit(
    State(state): State<AppState>,
    Json(request): Json<AdmissionRequest>,
) -> Result<Json<AdmitResult>, ApiError> {
    if request.display_name.trim().is_empty() {
        return Err(ApiError::bad_request(
            "invalid_display_name",
            "display_name must not be blank",
        ));
    }

    let result = state.allocator().try_admit(&request).await;
    debug!(item = %request.item, can_run = result.can_run(), "Admission checked");
    Ok(Json(result))
}

async fn forget(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<ReleaseOutcome>, ApiError> {
    let item: ItemId = item_id.parse()?;
    Ok(Json(state.allocator().forget_item(item).await))
}

async fn start(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<StartedTask>, ApiError> {
    let item: ItemId = item_id.parse()?;
    state
        .allocator()
        .on_start(item)
        .await
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found(
                "item_not_admitted",
                format!("item {item} has no pending admission"),
            )
        })
}

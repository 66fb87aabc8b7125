//! API v1 routes.

mod admissions;
mod inventory;
mod servers;
mod tasks;

use axum::Router;

use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/admissions", admissions::routes())
        .nest("/items", admissions::item_routes())
        .nest("/tasks", tasks::routes())
        .nest("/servers", servers::routes())
        .nest("/categories", servers::category_routes())
        .nest("/inventory", inventory::routes())
}

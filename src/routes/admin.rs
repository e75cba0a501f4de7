//! Platform admin routes. Authentication is expected in front of these.

use crate::handlers::admin::{analytics, cached_connections, evict_connection, plan_limits, update_limits};
use crate::state::AppState;
use axum::{
    routing::{delete, get, put},
    Router,
};

pub fn admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/admin/analytics", get(analytics))
        .route("/admin/plan-limits", get(plan_limits))
        .route("/admin/plan-limits/:plan", put(update_limits))
        .route("/admin/connections", get(cached_connections))
        .route("/admin/tenants/:slug/connection", delete(evict_connection))
        .with_state(state)
}

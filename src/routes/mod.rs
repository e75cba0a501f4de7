//! Router assembly.

mod admin;
mod common;
mod tenant;

pub use admin::admin_routes;
pub use common::common_routes;
pub use tenant::tenant_routes;

use crate::metrics::track_api_metrics;
use crate::state::AppState;
use axum::{middleware, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies above this size are rejected with 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Common routes at the root, tenant and admin routes under `/api/v1`, every request metered.
pub fn app_router(state: AppState) -> Router {
    let api = tenant_routes(state.clone()).merge(admin_routes(state.clone()));
    Router::new()
        .merge(common_routes(state.clone()))
        .nest("/api/v1", api)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(state.metrics.clone(), track_api_metrics))
}

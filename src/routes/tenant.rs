//! Tenant-scoped routes; the tenant comes from the `X-Tenant-Slug` header.

use crate::handlers::tenant::{create_record, list_records, usage};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn tenant_routes(state: AppState) -> Router {
    Router::new()
        .route("/usage", get(usage))
        .route("/records/:kind", get(list_records).post(create_record))
        .with_state(state)
}

//! Platform admin handlers: cross-tenant analytics, plan limits, connection eviction.

use crate::error::TenantError;
use crate::response::{success_many, success_one_ok, success_with_meta};
use crate::scanner::TenantAnalytics;
use crate::settings::{update_plan_limits, PlanLimitsUpdate};
use crate::state::AppState;
use crate::tenant::{normalize_slug, validate_slug, Plan};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::json;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TenantAnalyticsRow {
    slug: String,
    #[serde(flatten)]
    analytics: TenantAnalytics,
}

/// Per-tenant rollup. Failed tenants are listed in `meta.failed` rather than failing the request.
pub async fn analytics(State(state): State<AppState>) -> Result<impl IntoResponse, TenantError> {
    let report = state.tenancy.tenant_analytics().await?;
    let mut rows: Vec<TenantAnalyticsRow> = report
        .successes()
        .map(|(slug, a)| TenantAnalyticsRow {
            slug: slug.to_string(),
            analytics: *a,
        })
        .collect();
    rows.sort_by(|a, b| a.slug.cmp(&b.slug));
    let total_orders: u64 = rows.iter().map(|r| r.analytics.total_orders).sum();
    let total_revenue: f64 = rows.iter().map(|r| r.analytics.total_revenue).sum();
    let meta = json!({
        "tenants": report.total(),
        "failed": report.failed_slugs(),
        "totalOrders": total_orders,
        "totalRevenue": total_revenue,
    });
    Ok(success_with_meta(rows, meta))
}

pub async fn plan_limits(State(state): State<AppState>) -> Result<impl IntoResponse, TenantError> {
    let limits = state.tenancy.limiter().all_plan_limits().await?;
    Ok(success_one_ok(limits))
}

pub async fn update_limits(
    State(state): State<AppState>,
    Path(plan): Path<String>,
    Json(update): Json<PlanLimitsUpdate>,
) -> Result<impl IntoResponse, TenantError> {
    let plan: Plan = plan.parse()?;
    let settings = state.tenancy.settings().clone();
    update_plan_limits(settings.as_ref(), plan, update).await?;
    let limits = state.tenancy.limiter().resolve_limits(plan).await?;
    Ok(success_one_ok(json!({ "plan": plan, "limits": limits })))
}

/// Drops the tenant's cached connection; the next request re-establishes it.
pub async fn evict_connection(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, TenantError> {
    let slug = normalize_slug(&slug);
    validate_slug(&slug)?;
    let evicted = state.tenancy.evict_tenant(&slug).await;
    Ok(success_one_ok(json!({ "slug": slug, "evicted": evicted })))
}

pub async fn cached_connections(State(state): State<AppState>) -> Result<impl IntoResponse, TenantError> {
    Ok(success_many(state.tenancy.cache().cached_slugs()))
}

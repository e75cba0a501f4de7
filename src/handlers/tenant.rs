//! Tenant-scoped handlers: usage report and record listing/creation.

use crate::entity::EntityKind;
use crate::error::TenantError;
use crate::extractors::TenantSlug;
use crate::response::{success_many, success_one, success_one_ok};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

fn body_to_map(value: Value) -> Result<HashMap<String, Value>, TenantError> {
    match value {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(TenantError::Validation("body must be a JSON object".into())),
    }
}

/// Kinds in a URL are client input, so an unknown one is a validation error here.
fn parse_kind(raw: &str) -> Result<EntityKind, TenantError> {
    raw.parse()
        .map_err(|_| TenantError::Validation(format!("unknown collection: {}", raw)))
}

/// Query strings carry no types: integers, floats and booleans are recognised, the rest stays text.
fn query_value(s: &str) -> Value {
    if let Ok(n) = s.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = s.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return Value::Number(n);
    }
    if s.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    Value::String(s.to_string())
}

pub async fn usage(
    State(state): State<AppState>,
    TenantSlug(slug): TenantSlug,
) -> Result<impl IntoResponse, TenantError> {
    let report = state.tenancy.evaluate_usage(&slug).await?;
    Ok(success_one_ok(report))
}

pub async fn list_records(
    State(state): State<AppState>,
    TenantSlug(slug): TenantSlug,
    Path(kind): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, TenantError> {
    let kind = parse_kind(&kind)?;
    let mut limit: Option<u32> = None;
    let mut offset: Option<u32> = None;
    let mut filters: Vec<(String, Value)> = Vec::new();
    for (k, v) in params {
        match k.as_str() {
            "limit" => limit = v.parse().ok(),
            "offset" => offset = v.parse().ok(),
            _ => {
                let val = query_value(&v);
                filters.push((k, val));
            }
        }
    }
    let accessor = state.tenancy.factory().accessor(&slug, kind).await?;
    let rows = accessor.find(&filters, limit, offset).await?;
    Ok(success_many(rows))
}

/// Quota-gated for orders, users and menu items.
pub async fn create_record(
    State(state): State<AppState>,
    TenantSlug(slug): TenantSlug,
    Path(kind): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, TenantError> {
    let kind = parse_kind(&kind)?;
    let body = body_to_map(body)?;
    let row = state.tenancy.create_record(&slug, kind, &body).await?;
    Ok(success_one(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_values_are_typed() {
        assert_eq!(query_value("4"), Value::from(4));
        assert_eq!(query_value("12.5"), Value::from(12.5));
        assert_eq!(query_value("TRUE"), Value::Bool(true));
        assert_eq!(query_value("open"), Value::from("open"));
    }

    #[test]
    fn url_kind_errors_are_validation() {
        assert!(matches!(parse_kind("menu-items"), Ok(EntityKind::MenuItems)));
        assert!(matches!(parse_kind("payments"), Err(TenantError::Validation(_))));
    }
}

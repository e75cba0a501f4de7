//! Extract the tenant slug from the `X-Tenant-Slug` header.

use crate::error::TenantError;
use crate::tenant::normalize_slug;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const TENANT_SLUG_HEADER: &str = "X-Tenant-Slug";

/// Tenant slug resolved upstream (subdomain, auth token) and forwarded as a header.
#[derive(Clone, Debug)]
pub struct TenantSlug(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for TenantSlug
where
    S: Send + Sync,
{
    type Rejection = TenantError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(TENANT_SLUG_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(normalize_slug)
            .filter(|s| !s.is_empty())
            .map(TenantSlug)
            .ok_or_else(|| TenantError::Validation(format!("missing {} header", TENANT_SLUG_HEADER)))
    }
}

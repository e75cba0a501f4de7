//! Tenant directory: descriptors of onboarded tenants, read from the control plane.

use crate::error::TenantError;
use crate::store::qualified_control_table;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Subscription plan of a tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Trial,
    Basic,
    Premium,
    Enterprise,
}

impl Plan {
    pub const ALL: [Plan; 4] = [Plan::Trial, Plan::Basic, Plan::Premium, Plan::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Trial => "trial",
            Plan::Basic => "basic",
            Plan::Premium => "premium",
            Plan::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Plan {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trial" => Ok(Plan::Trial),
            "basic" => Ok(Plan::Basic),
            "premium" => Ok(Plan::Premium),
            "enterprise" => Ok(Plan::Enterprise),
            _ => Err(TenantError::Validation(format!(
                "invalid plan: {} (expected trial, basic, premium or enterprise)",
                s
            ))),
        }
    }
}

/// One tenant as known to the control plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantDescriptor {
    pub slug: String,
    pub is_active: bool,
    pub subscription_plan: Plan,
    pub created_at: DateTime<Utc>,
}

impl TenantDescriptor {
    /// Active tenant created now.
    pub fn new(slug: impl Into<String>, plan: Plan) -> Self {
        TenantDescriptor {
            slug: slug.into(),
            is_active: true,
            subscription_plan: plan,
            created_at: Utc::now(),
        }
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Read-only view of tenants owned by the control plane.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Descriptor for `slug`, active or not.
    async fn lookup(&self, slug: &str) -> Result<Option<TenantDescriptor>, TenantError>;

    /// Every registered tenant, in no particular order.
    async fn list_tenants(&self) -> Result<Vec<TenantDescriptor>, TenantError>;
}

/// In-memory tenant registry. Cheap to clone; clones share the same map.
#[derive(Clone, Default)]
pub struct TenantRegistry {
    by_slug: Arc<RwLock<HashMap<String, TenantDescriptor>>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        TenantRegistry::default()
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = TenantDescriptor>) -> Self {
        let by_slug = descriptors.into_iter().map(|d| (d.slug.clone(), d)).collect();
        TenantRegistry {
            by_slug: Arc::new(RwLock::new(by_slug)),
        }
    }

    pub fn get(&self, slug: &str) -> Option<TenantDescriptor> {
        self.by_slug.read().get(slug).cloned()
    }

    /// Insert or replace the descriptor for its slug.
    pub fn upsert(&self, descriptor: TenantDescriptor) {
        self.by_slug.write().insert(descriptor.slug.clone(), descriptor);
    }

    pub fn remove(&self, slug: &str) -> Option<TenantDescriptor> {
        self.by_slug.write().remove(slug)
    }

    /// Flip the active flag. Returns false when the slug is unknown.
    pub fn set_active(&self, slug: &str, active: bool) -> bool {
        match self.by_slug.write().get_mut(slug) {
            Some(d) => {
                d.is_active = active;
                true
            }
            None => false,
        }
    }

    pub fn set_plan(&self, slug: &str, plan: Plan) -> bool {
        match self.by_slug.write().get_mut(slug) {
            Some(d) => {
                d.subscription_plan = plan;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_slug.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slug.read().is_empty()
    }
}

#[async_trait]
impl TenantDirectory for TenantRegistry {
    async fn lookup(&self, slug: &str) -> Result<Option<TenantDescriptor>, TenantError> {
        Ok(self.get(slug))
    }

    async fn list_tenants(&self) -> Result<Vec<TenantDescriptor>, TenantError> {
        Ok(self.by_slug.read().values().cloned().collect())
    }
}

type TenantRow = (String, bool, String, DateTime<Utc>);

fn descriptor_from_row((slug, is_active, plan, created_at): TenantRow) -> Option<TenantDescriptor> {
    if validate_slug(&slug).is_err() {
        tracing::warn!("tenant {}: invalid slug, skipping", slug);
        return None;
    }
    let subscription_plan = plan.parse().unwrap_or_else(|_| {
        tracing::warn!("tenant {}: unknown plan '{}', treating as trial", slug, plan);
        Plan::Trial
    });
    Some(TenantDescriptor {
        slug,
        is_active,
        subscription_plan,
        created_at,
    })
}

fn tenants_sql(filter: &str) -> String {
    format!(
        "SELECT slug, is_active, subscription_plan, created_at FROM {} {} ORDER BY slug",
        qualified_control_table("tenants"),
        filter
    )
}

/// Load a registry snapshot from the control-plane tenants table. Invalid rows are skipped.
pub async fn load_registry_from_pool(pool: &PgPool) -> Result<TenantRegistry, TenantError> {
    let rows = sqlx::query_as::<_, TenantRow>(&tenants_sql(""))
        .fetch_all(pool)
        .await?;
    Ok(TenantRegistry::from_descriptors(
        rows.into_iter().filter_map(descriptor_from_row),
    ))
}

/// Directory that queries the control plane on every call.
#[derive(Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        PgTenantDirectory { pool }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn lookup(&self, slug: &str) -> Result<Option<TenantDescriptor>, TenantError> {
        let row = sqlx::query_as::<_, TenantRow>(&tenants_sql("WHERE slug = $1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(descriptor_from_row))
    }

    async fn list_tenants(&self) -> Result<Vec<TenantDescriptor>, TenantError> {
        let rows = sqlx::query_as::<_, TenantRow>(&tenants_sql(""))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().filter_map(descriptor_from_row).collect())
    }
}

fn slug_pattern() -> Result<&'static Regex, TenantError> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$"))
        .as_ref()
        .map_err(|e| TenantError::Validation(format!("slug pattern: {}", e)))
}

/// Derive a URL-safe slug from a display name ("Pizza Place!" -> "pizza-place").
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Canonical form of a slug received from a client: trimmed, lowercased.
pub fn normalize_slug(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn validate_slug(slug: &str) -> Result<(), TenantError> {
    if slug.len() > 63 || !slug_pattern()?.is_match(slug) {
        return Err(TenantError::Validation(format!("invalid tenant slug: {}", slug)));
    }
    Ok(())
}

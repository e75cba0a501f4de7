//! Entry point wiring directory, cache, factory, scanner and limiter together.

use crate::accessor::EntityAccessor;
use crate::backend::{ProvisionStatus, StorageBackend};
use crate::cache::ConnectionCache;
use crate::entity::EntityKind;
use crate::error::TenantError;
use crate::factory::ModelFactory;
use crate::limits::Resource;
use crate::scanner::{CrossTenantScanner, ScanOptions, ScanReport, TenantAnalytics};
use crate::settings::SettingsStore;
use crate::tenant::{slugify, validate_slug, TenantDirectory};
use crate::usage::{UsageLimiter, UsageReport};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Result of onboarding a new tenant.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Onboarding {
    pub slug: String,
    pub admin_email: String,
    pub provision: ProvisionStatus,
    /// Tenants whose users could not be checked for the admin email.
    pub unchecked_tenants: Vec<String>,
}

#[derive(Clone)]
pub struct Tenancy {
    factory: ModelFactory,
    scanner: CrossTenantScanner,
    limiter: UsageLimiter,
}

impl Tenancy {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        backend: Arc<dyn StorageBackend>,
        settings: Arc<dyn SettingsStore>,
        options: ScanOptions,
    ) -> Self {
        let cache = Arc::new(ConnectionCache::new(backend));
        let factory = ModelFactory::new(directory, cache);
        Tenancy {
            scanner: CrossTenantScanner::new(factory.clone(), options),
            limiter: UsageLimiter::new(factory.clone(), settings),
            factory,
        }
    }

    pub fn factory(&self) -> &ModelFactory {
        &self.factory
    }

    pub fn scanner(&self) -> &CrossTenantScanner {
        &self.scanner
    }

    pub fn limiter(&self) -> &UsageLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &Arc<ConnectionCache> {
        self.factory.cache()
    }

    pub fn directory(&self) -> &Arc<dyn TenantDirectory> {
        self.factory.directory()
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        self.limiter.settings()
    }

    pub async fn get_accessor(&self, slug: &str, kind: &str) -> Result<EntityAccessor, TenantError> {
        self.factory.get_accessor(slug, kind).await
    }

    pub async fn evaluate_usage(&self, slug: &str) -> Result<UsageReport, TenantError> {
        self.limiter.evaluate(slug).await
    }

    pub async fn scan_all_tenants<T, F, Fut>(&self, kind: EntityKind, op: F) -> Result<ScanReport<T>, TenantError>
    where
        F: Fn(EntityAccessor) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, TenantError>> + Send,
        T: Send,
    {
        self.scanner.scan(kind, op).await
    }

    /// Drop the cached handle so the next access re-establishes it.
    pub async fn evict_tenant(&self, slug: &str) -> bool {
        self.cache().evict(slug).await
    }

    pub async fn provision_tenant(&self, slug: &str) -> Result<ProvisionStatus, TenantError> {
        validate_slug(slug)?;
        self.cache().provision(slug).await
    }

    /// Create a record, going through the quota gate when the kind is quota-tracked.
    pub async fn create_record(
        &self,
        slug: &str,
        kind: EntityKind,
        body: &HashMap<String, Value>,
    ) -> Result<Value, TenantError> {
        match Resource::for_kind(kind) {
            Some(resource) => self.limiter.create_within_quota(slug, resource, body).await,
            None => self.factory.accessor(slug, kind).await?.create(body).await,
        }
    }

    /// Derive and reserve a slug, check the admin email is unused in every tenant, then
    /// provision storage. Registering the tenant in the directory is left to the caller.
    pub async fn onboard(&self, name: &str, admin_email: &str) -> Result<Onboarding, TenantError> {
        let slug = slugify(name);
        validate_slug(&slug)?;
        if self.directory().lookup(&slug).await?.is_some() {
            return Err(TenantError::Conflict(format!("tenant slug already taken: {}", slug)));
        }

        let admin_email = admin_email.trim().to_lowercase();
        if !is_plausible_email(&admin_email) {
            return Err(TenantError::Validation(format!("invalid email: {}", admin_email)));
        }
        let owner = self.scanner.email_owner(&admin_email).await?;
        if let Some((owner_slug, _)) = &owner.found {
            tracing::info!(slug = %slug, owner = %owner_slug, "admin email already registered");
            return Err(TenantError::Conflict(format!("email already registered: {}", admin_email)));
        }
        let unchecked_tenants = owner.unchecked_slugs();
        if !unchecked_tenants.is_empty() {
            tracing::warn!(slug = %slug, unchecked = ?unchecked_tenants, "email uniqueness not verified on all tenants");
        }

        let provision = self.cache().provision(&slug).await?;
        tracing::info!(slug = %slug, ?provision, "tenant onboarded");
        Ok(Onboarding {
            slug,
            admin_email,
            provision,
            unchecked_tenants,
        })
    }

    pub async fn tenant_analytics(&self) -> Result<ScanReport<TenantAnalytics>, TenantError> {
        self.scanner.tenant_analytics().await
    }

    /// Close every cached tenant handle.
    pub async fn shutdown(&self) -> usize {
        self.cache().evict_all().await
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

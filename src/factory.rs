//! Resolves (slug, kind) to an accessor over the tenant's cached handle.

use crate::accessor::EntityAccessor;
use crate::cache::ConnectionCache;
use crate::entity::{CapabilitySet, EntityKind};
use crate::error::TenantError;
use crate::tenant::{TenantDescriptor, TenantDirectory};
use std::sync::Arc;

#[derive(Clone)]
pub struct ModelFactory {
    directory: Arc<dyn TenantDirectory>,
    cache: Arc<ConnectionCache>,
}

impl ModelFactory {
    pub fn new(directory: Arc<dyn TenantDirectory>, cache: Arc<ConnectionCache>) -> Self {
        ModelFactory { directory, cache }
    }

    /// Kind is validated before the directory is consulted.
    pub async fn get_accessor(&self, slug: &str, kind: &str) -> Result<EntityAccessor, TenantError> {
        let kind: EntityKind = kind.parse()?;
        self.accessor(slug, kind).await
    }

    pub async fn accessor(&self, slug: &str, kind: EntityKind) -> Result<EntityAccessor, TenantError> {
        self.active_tenant(slug).await?;
        let handle = self.cache.get(slug).await?;
        Ok(EntityAccessor::new(handle, kind, CapabilitySet::full()))
    }

    /// Descriptor of an active tenant; unknown and inactive slugs are both `TenantNotFound`.
    pub async fn active_tenant(&self, slug: &str) -> Result<TenantDescriptor, TenantError> {
        match self.directory.lookup(slug).await? {
            Some(d) if d.is_active => Ok(d),
            _ => Err(TenantError::TenantNotFound { slug: slug.to_string() }),
        }
    }

    /// Read-only accessor without the active check, for cross-tenant scans.
    pub(crate) async fn scan_accessor(&self, slug: &str, kind: EntityKind) -> Result<EntityAccessor, TenantError> {
        let handle = self.cache.get(slug).await?;
        Ok(EntityAccessor::new(handle, kind, CapabilitySet::read_only()))
    }

    pub fn cache(&self) -> &Arc<ConnectionCache> {
        &self.cache
    }

    pub fn directory(&self) -> &Arc<dyn TenantDirectory> {
        &self.directory
    }
}

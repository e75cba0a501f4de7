//! Typed data accessor bound to one (tenant, entity kind) pair.

use crate::backend::Aggregate;
use crate::cache::TenantHandle;
use crate::entity::{Capability, CapabilitySet, EntityKind};
use crate::error::{StorageError, TenantError};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct EntityAccessor {
    handle: TenantHandle,
    kind: EntityKind,
    capabilities: CapabilitySet,
}

impl EntityAccessor {
    pub(crate) fn new(handle: TenantHandle, kind: EntityKind, capabilities: CapabilitySet) -> Self {
        EntityAccessor {
            handle,
            kind,
            capabilities,
        }
    }

    pub fn slug(&self) -> &str {
        self.handle.slug()
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn handle(&self) -> &TenantHandle {
        &self.handle
    }

    /// Same tenant, same capabilities, another collection.
    pub fn sibling(&self, kind: EntityKind) -> EntityAccessor {
        EntityAccessor::new(self.handle.clone(), kind, self.capabilities)
    }

    pub fn read_only(&self) -> EntityAccessor {
        self.restrict(CapabilitySet::read_only())
    }

    /// Narrow capabilities; never widens.
    pub fn restrict(&self, capabilities: CapabilitySet) -> EntityAccessor {
        EntityAccessor::new(self.handle.clone(), self.kind, self.capabilities.intersect(capabilities))
    }

    fn require(&self, capability: Capability) -> Result<(), TenantError> {
        if self.capabilities.contains(capability) {
            return Ok(());
        }
        Err(TenantError::CapabilityDenied {
            slug: self.slug().to_string(),
            kind: self.kind,
            capability,
        })
    }

    fn storage_error(&self, source: StorageError) -> TenantError {
        TenantError::Storage {
            slug: self.slug().to_string(),
            kind: self.kind,
            source,
        }
    }

    pub async fn create(&self, body: &HashMap<String, Value>) -> Result<Value, TenantError> {
        self.require(Capability::Create)?;
        tracing::debug!(slug = self.slug(), kind = %self.kind, "create");
        self.handle
            .store()
            .insert(self.kind, body)
            .await
            .map_err(|e| self.storage_error(e))
    }

    pub async fn read(&self, id: Uuid) -> Result<Option<Value>, TenantError> {
        self.require(Capability::Read)?;
        tracing::debug!(slug = self.slug(), kind = %self.kind, %id, "read");
        self.handle
            .store()
            .fetch(self.kind, id)
            .await
            .map_err(|e| self.storage_error(e))
    }

    /// Exact-match filters on document fields, newest first.
    pub async fn find(
        &self,
        filters: &[(String, Value)],
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Value>, TenantError> {
        self.require(Capability::Read)?;
        tracing::debug!(slug = self.slug(), kind = %self.kind, filters = filters.len(), "find");
        self.handle
            .store()
            .find(self.kind, filters, limit, offset)
            .await
            .map_err(|e| self.storage_error(e))
    }

    pub async fn find_one(&self, filters: &[(String, Value)]) -> Result<Option<Value>, TenantError> {
        Ok(self.find(filters, Some(1), None).await?.into_iter().next())
    }

    /// Newest row whose string `field` equals `value` ignoring case.
    pub async fn find_one_ignore_case(&self, field: &str, value: &str) -> Result<Option<Value>, TenantError> {
        self.require(Capability::Read)?;
        tracing::debug!(slug = self.slug(), kind = %self.kind, field, "find ignoring case");
        let rows = self
            .handle
            .store()
            .find_text_ignore_case(self.kind, field, value, Some(1))
            .await
            .map_err(|e| self.storage_error(e))?;
        Ok(rows.into_iter().next())
    }

    pub async fn update(&self, id: Uuid, body: &HashMap<String, Value>) -> Result<Option<Value>, TenantError> {
        self.require(Capability::Update)?;
        tracing::debug!(slug = self.slug(), kind = %self.kind, %id, "update");
        self.handle
            .store()
            .update(self.kind, id, body)
            .await
            .map_err(|e| self.storage_error(e))
    }

    pub async fn delete(&self, id: Uuid) -> Result<Option<Value>, TenantError> {
        self.require(Capability::Delete)?;
        tracing::debug!(slug = self.slug(), kind = %self.kind, %id, "delete");
        self.handle
            .store()
            .delete(self.kind, id)
            .await
            .map_err(|e| self.storage_error(e))
    }

    pub async fn count(&self, filters: &[(String, Value)]) -> Result<u64, TenantError> {
        self.require(Capability::Count)?;
        tracing::debug!(slug = self.slug(), kind = %self.kind, "count");
        self.handle
            .store()
            .count(self.kind, filters)
            .await
            .map_err(|e| self.storage_error(e))
    }

    pub async fn aggregate(&self, op: &Aggregate) -> Result<Value, TenantError> {
        self.require(Capability::Aggregate)?;
        tracing::debug!(slug = self.slug(), kind = %self.kind, ?op, "aggregate");
        self.handle
            .store()
            .aggregate(self.kind, op)
            .await
            .map_err(|e| self.storage_error(e))
    }
}

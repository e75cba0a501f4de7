//! Storage backend seam: provisions and opens isolated per-tenant namespaces.

pub mod memory;
pub mod postgres;

pub use memory::{Fault, MemoryBackend};
pub use postgres::{PgBackend, PgTenantStore};

use crate::entity::EntityKind;
use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Keys managed by the store on every record.
pub const RESERVED_KEYS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Default page size for `find` when no limit is given; requests are capped at `MAX_LIMIT`.
pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

/// Aggregation over one document field. Non-numeric values are ignored by numeric aggregates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Aggregate {
    Sum { field: String },
    Average { field: String },
    Min { field: String },
    Max { field: String },
    /// Record count per distinct field value, as a JSON object.
    CountBy { field: String },
}

impl Aggregate {
    pub fn field(&self) -> &str {
        match self {
            Aggregate::Sum { field }
            | Aggregate::Average { field }
            | Aggregate::Min { field }
            | Aggregate::Max { field }
            | Aggregate::CountBy { field } => field,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStatus {
    Created,
    AlreadyExists,
}

/// One tenant's isolated namespace. Rows are JSON objects with `id`, `created_at`, `updated_at`.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Namespace identifier (database name, map key).
    fn namespace(&self) -> &str;

    async fn insert(&self, kind: EntityKind, body: &HashMap<String, Value>) -> Result<Value, StorageError>;

    async fn fetch(&self, kind: EntityKind, id: Uuid) -> Result<Option<Value>, StorageError>;

    /// Exact-match filters on document fields, newest first.
    async fn find(
        &self,
        kind: EntityKind,
        filters: &[(String, Value)],
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Value>, StorageError>;

    /// Rows whose string `field` equals `value` ignoring case, newest first.
    async fn find_text_ignore_case(
        &self,
        kind: EntityKind,
        field: &str,
        value: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Value>, StorageError>;

    /// Merge `body` into the document. Returns the updated row, or None when absent.
    async fn update(
        &self,
        kind: EntityKind,
        id: Uuid,
        body: &HashMap<String, Value>,
    ) -> Result<Option<Value>, StorageError>;

    async fn delete(&self, kind: EntityKind, id: Uuid) -> Result<Option<Value>, StorageError>;

    async fn count(&self, kind: EntityKind, filters: &[(String, Value)]) -> Result<u64, StorageError>;

    async fn aggregate(&self, kind: EntityKind, op: &Aggregate) -> Result<Value, StorageError>;

    /// Release underlying resources. Later calls fail with `StorageError::Closed`.
    async fn close(&self);
}

#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Create the namespace for `slug` and its collections if they do not exist yet.
    async fn provision(&self, slug: &str) -> Result<ProvisionStatus, StorageError>;

    /// Open an existing namespace. Never creates one.
    async fn establish(&self, slug: &str) -> Result<Arc<dyn TenantStore>, StorageError>;
}

/// Split a request body into an optional caller-supplied id and the document without reserved keys.
pub(crate) fn split_document(body: &HashMap<String, Value>) -> Result<(Option<Uuid>, Map<String, Value>), StorageError> {
    let id = match body.get("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(
            Uuid::parse_str(s).map_err(|_| StorageError::InvalidDocument(format!("invalid id: {}", s)))?,
        ),
        Some(other) => return Err(StorageError::InvalidDocument(format!("invalid id: {}", other))),
    };
    Ok((id, strip_reserved(body)))
}

pub(crate) fn strip_reserved(body: &HashMap<String, Value>) -> Map<String, Value> {
    body.iter()
        .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub(crate) fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

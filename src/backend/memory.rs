//! In-process backend: one map of collections per tenant namespace.
//!
//! Counts establishments and supports per-slug fault injection, so callers can observe
//! single-flight behaviour and failure isolation without a database.

use super::{clamp_limit, split_document, strip_reserved, Aggregate, ProvisionStatus, StorageBackend, TenantStore};
use crate::entity::EntityKind;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Injected misbehaviour for one slug.
#[derive(Clone, Debug)]
pub enum Fault {
    /// `establish` fails as if the server were unreachable.
    EstablishFails(String),
    /// `establish` waits this long before completing.
    SlowEstablish(Duration),
    /// Every query on an established store fails.
    QueryFails(String),
    /// Every query on an established store never completes.
    Hang,
}

type Collections = HashMap<EntityKind, Vec<Value>>;

struct Namespace {
    collections: RwLock<Collections>,
}

#[derive(Default)]
struct Inner {
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
    faults: RwLock<HashMap<String, Fault>>,
    establish_delay: RwLock<Option<Duration>>,
    establishments: AtomicU64,
    establishments_by_slug: RwLock<HashMap<String, u64>>,
}

impl Inner {
    fn fault(&self, slug: &str) -> Option<Fault> {
        self.faults.read().get(slug).cloned()
    }
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// Total `establish` calls, successful or not.
    pub fn establishments(&self) -> u64 {
        self.inner.establishments.load(Ordering::SeqCst)
    }

    pub fn establishments_for(&self, slug: &str) -> u64 {
        self.inner.establishments_by_slug.read().get(slug).copied().unwrap_or(0)
    }

    /// Delay applied to every `establish` call (widens race windows).
    pub fn set_establish_delay(&self, delay: Option<Duration>) {
        *self.inner.establish_delay.write() = delay;
    }

    pub fn inject_fault(&self, slug: &str, fault: Fault) {
        self.inner.faults.write().insert(slug.to_string(), fault);
    }

    pub fn clear_fault(&self, slug: &str) {
        self.inner.faults.write().remove(slug);
    }

    pub fn is_provisioned(&self, slug: &str) -> bool {
        self.inner.namespaces.read().contains_key(slug)
    }

    /// Insert documents directly, provisioning the namespace when needed.
    pub fn seed(&self, slug: &str, kind: EntityKind, docs: impl IntoIterator<Item = Value>) {
        let ns = self.namespace_or_create(slug).0;
        let mut collections = ns.collections.write();
        let rows = collections.entry(kind).or_default();
        for doc in docs {
            let body: HashMap<String, Value> = match doc {
                Value::Object(m) => m.into_iter().collect(),
                _ => HashMap::new(),
            };
            rows.push(new_row(Uuid::new_v4(), strip_reserved(&body)));
        }
    }

    /// Rows currently stored, bypassing faults and closed handles.
    pub fn record_count(&self, slug: &str, kind: EntityKind) -> usize {
        self.inner
            .namespaces
            .read()
            .get(slug)
            .map(|ns| ns.collections.read().get(&kind).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    fn namespace_or_create(&self, slug: &str) -> (Arc<Namespace>, ProvisionStatus) {
        let mut namespaces = self.inner.namespaces.write();
        if let Some(ns) = namespaces.get(slug) {
            return (ns.clone(), ProvisionStatus::AlreadyExists);
        }
        let collections = EntityKind::ALL.iter().map(|k| (*k, Vec::new())).collect();
        let ns = Arc::new(Namespace {
            collections: RwLock::new(collections),
        });
        namespaces.insert(slug.to_string(), ns.clone());
        (ns, ProvisionStatus::Created)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn provision(&self, slug: &str) -> Result<ProvisionStatus, StorageError> {
        if let Some(Fault::EstablishFails(msg)) = self.inner.fault(slug) {
            return Err(StorageError::Unreachable(msg));
        }
        Ok(self.namespace_or_create(slug).1)
    }

    async fn establish(&self, slug: &str) -> Result<Arc<dyn TenantStore>, StorageError> {
        self.inner.establishments.fetch_add(1, Ordering::SeqCst);
        *self
            .inner
            .establishments_by_slug
            .write()
            .entry(slug.to_string())
            .or_insert(0) += 1;

        let fault = self.inner.fault(slug);
        let delay = match &fault {
            Some(Fault::SlowEstablish(d)) => Some(*d),
            _ => *self.inner.establish_delay.read(),
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(Fault::EstablishFails(msg)) = fault {
            return Err(StorageError::Unreachable(msg));
        }

        let namespace = self
            .inner
            .namespaces
            .read()
            .get(slug)
            .cloned()
            .ok_or_else(|| StorageError::NotProvisioned(slug.to_string()))?;
        Ok(Arc::new(MemoryStore {
            slug: slug.to_string(),
            namespace,
            backend: self.inner.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct MemoryStore {
    slug: String,
    namespace: Arc<Namespace>,
    backend: Arc<Inner>,
    closed: AtomicBool,
}

impl MemoryStore {
    async fn ready(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        match self.backend.fault(&self.slug) {
            Some(Fault::QueryFails(msg)) => Err(StorageError::Query(msg)),
            Some(Fault::Hang) => {
                std::future::pending::<()>().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn new_row(id: Uuid, doc: Map<String, Value>) -> Value {
    let now = Value::String(Utc::now().to_rfc3339());
    let mut row = Map::new();
    row.insert("id".into(), Value::String(id.to_string()));
    row.extend(doc);
    row.insert("created_at".into(), now.clone());
    row.insert("updated_at".into(), now);
    Value::Object(row)
}

fn matches(row: &Value, filters: &[(String, Value)]) -> bool {
    filters.iter().all(|(k, v)| row.get(k) == Some(v))
}

fn text_eq_ignore_case(row: &Value, field: &str, folded: &str) -> bool {
    row.get(field)
        .and_then(Value::as_str)
        .map(|s| s.to_lowercase() == folded)
        .unwrap_or(false)
}

fn has_id(row: &Value, id: &str) -> bool {
    row.get("id").and_then(Value::as_str) == Some(id)
}

fn group_key(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn number(v: f64) -> Value {
    serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

#[async_trait]
impl TenantStore for MemoryStore {
    fn namespace(&self) -> &str {
        &self.slug
    }

    async fn insert(&self, kind: EntityKind, body: &HashMap<String, Value>) -> Result<Value, StorageError> {
        self.ready().await?;
        let (id, doc) = split_document(body)?;
        let id = id.unwrap_or_else(Uuid::new_v4);
        let id_str = id.to_string();
        let mut collections = self.namespace.collections.write();
        let rows = collections.entry(kind).or_default();
        if rows.iter().any(|r| has_id(r, &id_str)) {
            return Err(StorageError::Query(format!("duplicate id {}", id_str)));
        }
        let row = new_row(id, doc);
        rows.push(row.clone());
        Ok(row)
    }

    async fn fetch(&self, kind: EntityKind, id: Uuid) -> Result<Option<Value>, StorageError> {
        self.ready().await?;
        let id = id.to_string();
        let collections = self.namespace.collections.read();
        Ok(collections
            .get(&kind)
            .and_then(|rows| rows.iter().find(|r| has_id(r, &id)).cloned()))
    }

    async fn find(
        &self,
        kind: EntityKind,
        filters: &[(String, Value)],
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Value>, StorageError> {
        self.ready().await?;
        let collections = self.namespace.collections.read();
        let Some(rows) = collections.get(&kind) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .rev()
            .filter(|r| matches(r, filters))
            .skip(offset.unwrap_or(0) as usize)
            .take(clamp_limit(limit) as usize)
            .cloned()
            .collect())
    }

    async fn find_text_ignore_case(
        &self,
        kind: EntityKind,
        field: &str,
        value: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Value>, StorageError> {
        self.ready().await?;
        let folded = value.to_lowercase();
        let collections = self.namespace.collections.read();
        let Some(rows) = collections.get(&kind) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .rev()
            .filter(|r| text_eq_ignore_case(r, field, &folded))
            .take(clamp_limit(limit) as usize)
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: Uuid,
        body: &HashMap<String, Value>,
    ) -> Result<Option<Value>, StorageError> {
        self.ready().await?;
        let id = id.to_string();
        let mut collections = self.namespace.collections.write();
        let Some(row) = collections
            .get_mut(&kind)
            .and_then(|rows| rows.iter_mut().find(|r| has_id(r, &id)))
        else {
            return Ok(None);
        };
        if let Value::Object(fields) = row {
            fields.extend(strip_reserved(body));
            fields.insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, kind: EntityKind, id: Uuid) -> Result<Option<Value>, StorageError> {
        self.ready().await?;
        let id = id.to_string();
        let mut collections = self.namespace.collections.write();
        let Some(rows) = collections.get_mut(&kind) else {
            return Ok(None);
        };
        Ok(rows.iter().position(|r| has_id(r, &id)).map(|i| rows.remove(i)))
    }

    async fn count(&self, kind: EntityKind, filters: &[(String, Value)]) -> Result<u64, StorageError> {
        self.ready().await?;
        let collections = self.namespace.collections.read();
        Ok(collections
            .get(&kind)
            .map(|rows| rows.iter().filter(|r| matches(r, filters)).count() as u64)
            .unwrap_or(0))
    }

    async fn aggregate(&self, kind: EntityKind, op: &Aggregate) -> Result<Value, StorageError> {
        self.ready().await?;
        let collections = self.namespace.collections.read();
        let rows: &[Value] = collections.get(&kind).map(Vec::as_slice).unwrap_or(&[]);
        let field = op.field();
        if let Aggregate::CountBy { .. } = op {
            let mut groups: Map<String, Value> = Map::new();
            for row in rows {
                let key = group_key(row.get(field));
                let n = groups.get(&key).and_then(Value::as_u64).unwrap_or(0);
                groups.insert(key, Value::from(n + 1));
            }
            return Ok(Value::Object(groups));
        }
        let values: Vec<f64> = rows
            .iter()
            .filter_map(|r| r.get(field).and_then(Value::as_f64))
            .collect();
        Ok(match op {
            Aggregate::Sum { .. } => number(values.iter().sum()),
            Aggregate::Average { .. } if values.is_empty() => Value::Null,
            Aggregate::Average { .. } => number(values.iter().sum::<f64>() / values.len() as f64),
            Aggregate::Min { .. } => values.iter().copied().reduce(f64::min).map(number).unwrap_or(Value::Null),
            Aggregate::Max { .. } => values.iter().copied().reduce(f64::max).map(number).unwrap_or(Value::Null),
            Aggregate::CountBy { .. } => Value::Null,
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

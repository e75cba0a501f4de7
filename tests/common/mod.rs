#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tenancy_sdk::{
    EntityKind, MemoryBackend, MemorySettingsStore, Plan, ScanOptions, Tenancy, TenantDescriptor, TenantRegistry,
};

pub struct Fixture {
    pub registry: TenantRegistry,
    pub backend: MemoryBackend,
    pub settings: MemorySettingsStore,
    pub tenancy: Tenancy,
}

/// Registered, provisioned, active tenants on the in-memory backend.
pub async fn fixture(tenants: &[(&str, Plan)]) -> Fixture {
    fixture_with(tenants, ScanOptions::default()).await
}

pub async fn fixture_with(tenants: &[(&str, Plan)], options: ScanOptions) -> Fixture {
    let registry = TenantRegistry::new();
    let backend = MemoryBackend::new();
    let settings = MemorySettingsStore::new();
    for (slug, plan) in tenants {
        registry.upsert(TenantDescriptor::new(*slug, *plan));
        backend.seed(slug, EntityKind::Users, Vec::<Value>::new());
    }
    let tenancy = Tenancy::new(
        Arc::new(registry.clone()),
        Arc::new(backend.clone()),
        Arc::new(settings.clone()),
        options,
    );
    Fixture {
        registry,
        backend,
        settings,
        tenancy,
    }
}

pub fn short_timeouts() -> ScanOptions {
    ScanOptions {
        concurrency: 4,
        tenant_timeout: Duration::from_millis(200),
    }
}

pub fn doc(v: Value) -> HashMap<String, Value> {
    match v {
        Value::Object(m) => m.into_iter().collect(),
        _ => HashMap::new(),
    }
}

pub fn menu_items(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| json!({ "name": format!("Dish {}", i), "price": 9.5 }))
        .collect()
}

pub fn orders(totals: &[f64]) -> Vec<Value> {
    totals
        .iter()
        .map(|t| json!({ "total": t, "status": "served" }))
        .collect()
}

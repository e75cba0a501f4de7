//! Process-wide cache of per-tenant storage handles with single-flight establishment.
//!
//! A slot is either `Ready` or `Pending`. The first caller for a slug spawns the
//! establishment task and parks a shared future in the slot; later callers await the
//! same future. Whoever observes the result first settles the slot, but only if it still
//! holds the same generation, so an eviction during establishment wins.

use crate::backend::{ProvisionStatus, StorageBackend, TenantStore};
use crate::error::{StorageError, TenantError};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cloneable handle to one tenant namespace.
#[derive(Clone)]
pub struct TenantHandle {
    slug: Arc<str>,
    store: Arc<dyn TenantStore>,
    established_at: DateTime<Utc>,
    generation: u64,
}

impl TenantHandle {
    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when both come from the same establishment.
    pub fn same_as(&self, other: &TenantHandle) -> bool {
        self.generation == other.generation && self.slug == other.slug
    }
}

impl fmt::Debug for TenantHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantHandle")
            .field("slug", &self.slug)
            .field("namespace", &self.store.namespace())
            .field("generation", &self.generation)
            .field("established_at", &self.established_at)
            .finish()
    }
}

type Establishment = Shared<BoxFuture<'static, Result<TenantHandle, Arc<StorageError>>>>;

enum Slot {
    Ready(TenantHandle),
    Pending { generation: u64, future: Establishment },
}

#[derive(Default)]
struct Counters {
    establishments: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub establishments: u64,
    pub failures: u64,
    pub evictions: u64,
    pub cached: usize,
}

pub struct ConnectionCache {
    backend: Arc<dyn StorageBackend>,
    slots: Mutex<HashMap<String, Slot>>,
    next_generation: AtomicU64,
    counters: Arc<Counters>,
}

impl ConnectionCache {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        ConnectionCache {
            backend,
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Cached handle, or the result of the one in-flight establishment for this slug.
    pub async fn get(&self, slug: &str) -> Result<TenantHandle, TenantError> {
        let (generation, future) = {
            let mut slots = self.slots.lock();
            match slots.get(slug) {
                Some(Slot::Ready(handle)) => return Ok(handle.clone()),
                Some(Slot::Pending { generation, future }) => (*generation, future.clone()),
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let future = self.spawn_establish(slug, generation);
                    slots.insert(
                        slug.to_string(),
                        Slot::Pending {
                            generation,
                            future: future.clone(),
                        },
                    );
                    (generation, future)
                }
            }
        };

        let result = future.await;
        self.settle(slug, generation, &result);
        result.map_err(|source| TenantError::TenantUnavailable {
            slug: slug.to_string(),
            source,
        })
    }

    fn spawn_establish(&self, slug: &str, generation: u64) -> Establishment {
        let backend = self.backend.clone();
        let counters = self.counters.clone();
        let slug: Arc<str> = Arc::from(slug);
        let task = tokio::spawn(async move {
            counters.establishments.fetch_add(1, Ordering::SeqCst);
            let started = Instant::now();
            match backend.establish(&slug).await {
                Ok(store) => {
                    tracing::info!(
                        slug = %slug,
                        namespace = store.namespace(),
                        generation,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "tenant connection established"
                    );
                    Ok(TenantHandle {
                        slug,
                        store,
                        established_at: Utc::now(),
                        generation,
                    })
                }
                Err(e) => {
                    counters.failures.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(slug = %slug, error = %e, "tenant connection failed");
                    Err(e)
                }
            }
        });
        async move {
            match task.await {
                Ok(result) => result.map_err(Arc::new),
                Err(e) => Err(Arc::new(StorageError::Task(e.to_string()))),
            }
        }
        .boxed()
        .shared()
    }

    /// Cache the outcome if the slot still belongs to this establishment.
    fn settle(&self, slug: &str, generation: u64, result: &Result<TenantHandle, Arc<StorageError>>) {
        let mut slots = self.slots.lock();
        let current = matches!(
            slots.get(slug),
            Some(Slot::Pending { generation: g, .. }) if *g == generation
        );
        if !current {
            if result.is_ok() {
                tracing::debug!(slug, generation, "detached tenant connection handed to waiters only");
            }
            return;
        }
        match result {
            Ok(handle) => {
                slots.insert(slug.to_string(), Slot::Ready(handle.clone()));
            }
            Err(_) => {
                slots.remove(slug);
            }
        }
    }

    /// Drop the slot for `slug`, closing a ready handle. Returns false when nothing was cached.
    ///
    /// A pending establishment is detached instead: its waiters still receive the handle and
    /// the cache never closes it. Its resources are released when the last waiter drops its
    /// clone (a `PgPool` closes once every clone is dropped).
    pub async fn evict(&self, slug: &str) -> bool {
        let removed = self.slots.lock().remove(slug);
        let Some(slot) = removed else {
            return false;
        };
        self.counters.evictions.fetch_add(1, Ordering::SeqCst);
        match slot {
            Slot::Ready(handle) => {
                handle.store.close().await;
                tracing::info!(slug, generation = handle.generation, "tenant connection evicted");
            }
            Slot::Pending { generation, .. } => {
                tracing::info!(slug, generation, "pending tenant connection detached");
            }
        }
        true
    }

    /// Close every cached handle. Used on shutdown.
    pub async fn evict_all(&self) -> usize {
        let drained: Vec<(String, Slot)> = self.slots.lock().drain().collect();
        let n = drained.len();
        for (_, slot) in drained {
            if let Slot::Ready(handle) = slot {
                handle.store.close().await;
            }
        }
        self.counters.evictions.fetch_add(n as u64, Ordering::SeqCst);
        if n > 0 {
            tracing::info!(count = n, "all tenant connections evicted");
        }
        n
    }

    /// Create the tenant namespace. `get` never does this implicitly.
    pub async fn provision(&self, slug: &str) -> Result<ProvisionStatus, TenantError> {
        self.backend
            .provision(slug)
            .await
            .map_err(|e| TenantError::TenantUnavailable {
                slug: slug.to_string(),
                source: Arc::new(e),
            })
    }

    /// Whether a ready handle is cached for `slug`.
    pub fn contains(&self, slug: &str) -> bool {
        matches!(self.slots.lock().get(slug), Some(Slot::Ready(_)))
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cached_slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, s)| matches!(s, Slot::Ready(_)))
            .map(|(k, _)| k.clone())
            .collect();
        slugs.sort();
        slugs
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            establishments: self.counters.establishments.load(Ordering::SeqCst),
            failures: self.counters.failures.load(Ordering::SeqCst),
            evictions: self.counters.evictions.load(Ordering::SeqCst),
            cached: self.len(),
        }
    }
}

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tenancy_sdk::{ConnectionCache, EntityKind, Fault, MemoryBackend, StorageBackend, StorageError, TenantError};

async fn provisioned(slugs: &[&str]) -> (MemoryBackend, Arc<ConnectionCache>) {
    let backend = MemoryBackend::new();
    for slug in slugs {
        backend.provision(slug).await.unwrap();
    }
    let cache = Arc::new(ConnectionCache::new(Arc::new(backend.clone())));
    (backend, cache)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_access_establishes_once() {
    let (backend, cache) = provisioned(&["a"]).await;
    backend.set_establish_delay(Some(Duration::from_millis(50)));

    let handles = join_all((0..16).map(|_| {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get("a").await })
    }))
    .await;

    let handles: Vec<_> = handles.into_iter().map(|h| h.unwrap().unwrap()).collect();
    assert_eq!(backend.establishments_for("a"), 1);
    assert!(handles.iter().all(|h| h.same_as(&handles[0])));
    assert_eq!(cache.stats().establishments, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_waiters_share_one_failure() {
    let (backend, cache) = provisioned(&["a"]).await;
    backend.set_establish_delay(Some(Duration::from_millis(30)));
    backend.inject_fault("a", Fault::EstablishFails("connection refused".into()));

    let results = join_all((0..8).map(|_| cache.get("a"))).await;
    assert!(results.iter().all(|r| matches!(r, Err(TenantError::TenantUnavailable { .. }))));
    assert_eq!(backend.establishments_for("a"), 1);

    // Failures are not cached: the next call tries again.
    backend.clear_fault("a");
    assert!(cache.get("a").await.is_ok());
    assert_eq!(backend.establishments_for("a"), 2);
}

#[tokio::test]
async fn slow_tenant_does_not_block_others() {
    let (backend, cache) = provisioned(&["slow", "fast"]).await;
    backend.inject_fault("slow", Fault::SlowEstablish(Duration::from_secs(5)));

    let slow = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get("slow").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let fast = tokio::time::timeout(Duration::from_secs(1), cache.get("fast")).await;
    assert!(matches!(fast, Ok(Ok(_))));
    slow.abort();
}

#[tokio::test]
async fn eviction_forces_reestablishment() {
    let (backend, cache) = provisioned(&["a"]).await;
    let first = cache.get("a").await.unwrap();
    assert!(cache.contains("a"));

    assert!(cache.evict("a").await);
    assert!(!cache.contains("a"));
    assert!(matches!(
        first.store().count(EntityKind::Orders, &[]).await,
        Err(StorageError::Closed)
    ));

    let second = cache.get("a").await.unwrap();
    assert!(!second.same_as(&first));
    assert_eq!(backend.establishments_for("a"), 2);
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test]
async fn eviction_during_establishment_is_not_cached() {
    let (backend, cache) = provisioned(&["a"]).await;
    backend.set_establish_delay(Some(Duration::from_millis(100)));

    let pending = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get("a").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(cache.evict("a").await);

    // The detached waiter still gets a usable handle.
    let detached = pending.await.unwrap().unwrap();
    assert!(!cache.contains("a"));
    assert_eq!(detached.store().count(EntityKind::Users, &[]).await.unwrap(), 0);

    backend.set_establish_delay(None);
    let fresh = cache.get("a").await.unwrap();
    assert!(!fresh.same_as(&detached));
    assert_eq!(backend.establishments_for("a"), 2);

    // Evicting the fresh handle leaves the detached one untouched.
    assert!(cache.evict("a").await);
    assert!(fresh.store().count(EntityKind::Users, &[]).await.is_err());
    assert!(detached.store().count(EntityKind::Users, &[]).await.is_ok());
}

#[tokio::test]
async fn cancelled_caller_does_not_abort_establishment() {
    let (backend, cache) = provisioned(&["a"]).await;
    backend.set_establish_delay(Some(Duration::from_millis(50)));

    let cancelled = tokio::time::timeout(Duration::from_millis(5), cache.get("a")).await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(80)).await;
    let handle = cache.get("a").await.unwrap();
    assert_eq!(handle.slug(), "a");
    assert_eq!(backend.establishments_for("a"), 1);
    assert!(cache.contains("a"));
}

#[tokio::test]
async fn evict_all_closes_every_handle() {
    let (_backend, cache) = provisioned(&["a", "b", "c"]).await;
    let mut handles = Vec::new();
    for slug in ["a", "b", "c"] {
        handles.push(cache.get(slug).await.unwrap());
    }
    assert_eq!(cache.cached_slugs(), vec!["a", "b", "c"]);

    assert_eq!(cache.evict_all().await, 3);
    assert!(cache.is_empty());
    for h in handles {
        assert!(h.store().count(EntityKind::Users, &[]).await.is_err());
    }
}

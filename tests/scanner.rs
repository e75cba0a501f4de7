mod common;

use common::{fixture, fixture_with, menu_items, orders, short_timeouts};
use serde_json::json;
use tenancy_sdk::{EntityKind, Fault, Plan, ScanOptions, TenantDescriptor, TenantError};

#[tokio::test]
async fn one_failing_tenant_does_not_abort_the_scan() {
    let fx = fixture(&[("a", Plan::Basic), ("b", Plan::Basic), ("c", Plan::Basic)]).await;
    fx.backend.seed("a", EntityKind::Orders, orders(&[10.0, 5.0]));
    fx.backend.seed("c", EntityKind::Orders, orders(&[7.0]));
    fx.backend.inject_fault("b", Fault::QueryFails("connection reset".into()));

    let report = fx
        .tenancy
        .scan_all_tenants(EntityKind::Orders, |orders| async move { orders.count(&[]).await })
        .await
        .unwrap();

    assert_eq!(report.total(), 3);
    assert!(!report.is_complete());
    assert_eq!(report.failed_slugs(), vec!["b"]);
    assert!(matches!(report.get("a"), Some(Ok(2))));
    assert!(matches!(report.get("c"), Some(Ok(1))));
    assert!(matches!(report.get("b"), Some(Err(TenantError::Storage { .. }))));

    match report.into_result() {
        Err(TenantError::PartialScanFailure { failed, total, kind }) => {
            assert_eq!(failed, vec!["b"]);
            assert_eq!(total, 3);
            assert_eq!(kind, EntityKind::Orders);
        }
        other => panic!("expected partial failure, got {:?}", other.map(|m| m.len())),
    }
}

#[tokio::test]
async fn hanging_tenant_times_out() {
    let fx = fixture_with(&[("a", Plan::Basic), ("stuck", Plan::Basic)], short_timeouts()).await;
    fx.backend.inject_fault("stuck", Fault::Hang);

    let report = fx
        .tenancy
        .scan_all_tenants(EntityKind::Users, |users| async move { users.count(&[]).await })
        .await
        .unwrap();

    assert!(matches!(report.get("a"), Some(Ok(0))));
    assert!(matches!(report.get("stuck"), Some(Err(TenantError::Timeout { .. }))));
}

#[tokio::test]
async fn unreachable_tenant_is_reported_not_raised() {
    let fx = fixture(&[("a", Plan::Basic), ("down", Plan::Basic)]).await;
    fx.backend.inject_fault("down", Fault::EstablishFails("no route to host".into()));

    let report = fx
        .tenancy
        .scan_all_tenants(EntityKind::Users, |users| async move { users.count(&[]).await })
        .await
        .unwrap();
    assert_eq!(report.successes().count(), 1);
    let (slug, err) = report.failures().next().unwrap();
    assert_eq!(slug, "down");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn inactive_tenants_are_scanned() {
    let fx = fixture(&[("a", Plan::Basic)]).await;
    fx.registry.upsert(TenantDescriptor::new("paused", Plan::Basic).deactivated());
    fx.backend.seed("paused", EntityKind::Users, [json!({"email": "chef@paused.io"})]);

    let report = fx
        .tenancy
        .scan_all_tenants(EntityKind::Users, |users| async move { users.count(&[]).await })
        .await
        .unwrap();
    assert!(matches!(report.get("paused"), Some(Ok(1))));
}

#[tokio::test]
async fn scanner_accessors_are_read_only() {
    let fx = fixture(&[("a", Plan::Basic)]).await;
    let report = fx
        .tenancy
        .scan_all_tenants(EntityKind::Users, |users| async move {
            users.create(&common::doc(json!({"email": "x@y.io"}))).await
        })
        .await
        .unwrap();
    assert!(matches!(report.get("a"), Some(Err(TenantError::CapabilityDenied { .. }))));
    assert_eq!(fx.backend.record_count("a", EntityKind::Users), 0);
}

#[tokio::test]
async fn email_owner_short_circuits() {
    let options = ScanOptions {
        concurrency: 1,
        ..ScanOptions::default()
    };
    let fx = fixture_with(&[("a", Plan::Basic), ("b", Plan::Basic), ("c", Plan::Basic)], options).await;
    fx.backend.seed("b", EntityKind::Users, [json!({"email": "owner@bistro.io"})]);

    let hit = fx.tenancy.scanner().email_owner("  Owner@Bistro.IO ").await.unwrap();
    let (slug, user) = hit.found.expect("email should be found");
    assert_eq!(slug, "b");
    assert_eq!(user["email"], "owner@bistro.io");

    let miss = fx.tenancy.scanner().email_owner("nobody@bistro.io").await.unwrap();
    assert!(miss.found.is_none());
    assert_eq!(miss.visited, 3);
    assert!(miss.failures.is_empty());
}

#[tokio::test]
async fn analytics_rollup_per_tenant() {
    let fx = fixture(&[("a", Plan::Basic), ("b", Plan::Basic)]).await;
    fx.backend.seed("a", EntityKind::Orders, orders(&[12.5, 7.5]));
    fx.backend.seed("a", EntityKind::MenuItems, menu_items(3));
    fx.backend.seed("b", EntityKind::Orders, [json!({"total": "n/a"})]);

    let report = fx.tenancy.tenant_analytics().await.unwrap();
    let by_slug = report.into_result().unwrap();
    let a = by_slug["a"];
    assert_eq!(a.total_orders, 2);
    assert!((a.total_revenue - 20.0).abs() < 1e-9);
    assert_eq!(a.menu_count, 3);
    let b = by_slug["b"];
    assert_eq!(b.total_orders, 1);
    assert_eq!(b.total_revenue, 0.0);
}

#[tokio::test]
async fn onboarding_checks_slug_and_email() {
    let fx = fixture(&[("pizza-place", Plan::Basic), ("taco-bar", Plan::Trial)]).await;
    fx.backend.seed("taco-bar", EntityKind::Users, [json!({"email": "owner@taco.io"})]);

    let taken = fx.tenancy.onboard("Pizza Place", "new@pizza.io").await.unwrap_err();
    assert!(matches!(taken, TenantError::Conflict(_)));

    let dup = fx.tenancy.onboard("Noodle House", "OWNER@taco.io").await.unwrap_err();
    assert!(matches!(dup, TenantError::Conflict(_)));
    assert!(!fx.backend.is_provisioned("noodle-house"));

    fx.backend.inject_fault("pizza-place", Fault::QueryFails("down".into()));
    let done = fx.tenancy.onboard("Noodle House", "chef@noodle.io").await.unwrap();
    assert_eq!(done.slug, "noodle-house");
    assert_eq!(done.unchecked_tenants, vec!["pizza-place"]);
    assert!(fx.backend.is_provisioned("noodle-house"));

    let invalid = fx.tenancy.onboard("!!!", "chef@noodle.io").await.unwrap_err();
    assert!(matches!(invalid, TenantError::Validation(_)));
}

#[tokio::test]
async fn mixed_case_stored_email_is_found() {
    let fx = fixture(&[("taco-bar", Plan::Basic)]).await;
    fx.backend.seed("taco-bar", EntityKind::Users, [json!({"email": "Owner@Taco.io"})]);

    for query in ["owner@taco.io", "Owner@Taco.io", " OWNER@TACO.IO "] {
        let hit = fx.tenancy.scanner().email_owner(query).await.unwrap();
        assert_eq!(hit.found.map(|(slug, _)| slug).as_deref(), Some("taco-bar"), "{query}");
    }
}

#[tokio::test]
async fn onboarding_rejects_email_stored_with_other_case() {
    let fx = fixture(&[("taco-bar", Plan::Basic)]).await;
    fx.backend.seed("taco-bar", EntityKind::Users, [json!({"email": "Owner@Taco.io"})]);

    let err = fx.tenancy.onboard("Noodle House", "owner@taco.io").await.unwrap_err();
    assert!(matches!(err, TenantError::Conflict(_)));
    assert!(!fx.backend.is_provisioned("noodle-house"));
}

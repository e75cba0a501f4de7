mod common;

use common::{doc, fixture};
use serde_json::json;
use tenancy_sdk::{Capability, CapabilitySet, EntityKind, Fault, Plan, TenantDescriptor, TenantError};

#[tokio::test]
async fn kind_is_validated_before_tenant() {
    let fx = fixture(&[("a", Plan::Basic)]).await;
    let err = fx.tenancy.get_accessor("nobody", "payments").await.unwrap_err();
    assert!(matches!(err, TenantError::UnknownEntityKind { ref kind } if kind == "payments"));
    assert!(!err.is_retryable());
    assert_eq!(fx.backend.establishments(), 0);
}

#[tokio::test]
async fn unknown_and_inactive_tenants_are_not_found() {
    let fx = fixture(&[("a", Plan::Basic)]).await;
    fx.registry.upsert(TenantDescriptor::new("closed", Plan::Basic).deactivated());
    fx.backend.seed("closed", EntityKind::Users, Vec::new());

    for slug in ["nobody", "closed"] {
        let err = fx.tenancy.get_accessor(slug, "orders").await.unwrap_err();
        assert!(matches!(err, TenantError::TenantNotFound { .. }), "{slug}: {err}");
    }
    assert_eq!(fx.backend.establishments(), 0);
}

#[tokio::test]
async fn same_arguments_share_one_handle() {
    let fx = fixture(&[("a", Plan::Basic)]).await;
    let first = fx.tenancy.get_accessor("a", "menu-items").await.unwrap();
    let second = fx.tenancy.get_accessor("a", "MENU_ITEMS").await.unwrap();
    assert_eq!(first.kind(), EntityKind::MenuItems);
    assert!(first.handle().same_as(second.handle()));
    assert_eq!(fx.backend.establishments_for("a"), 1);
}

#[tokio::test]
async fn accessors_stay_inside_their_tenant() {
    let fx = fixture(&[("a", Plan::Basic), ("b", Plan::Basic)]).await;
    let a_orders = fx.tenancy.get_accessor("a", "orders").await.unwrap();
    let b_orders = fx.tenancy.get_accessor("b", "orders").await.unwrap();

    let created = a_orders.create(&doc(json!({"total": 18.0}))).await.unwrap();
    assert_eq!(a_orders.count(&[]).await.unwrap(), 1);
    assert_eq!(b_orders.count(&[]).await.unwrap(), 0);

    let id = uuid::Uuid::parse_str(created["id"].as_str().unwrap()).unwrap();
    assert!(b_orders.read(id).await.unwrap().is_none());

    let a_menu = a_orders.sibling(EntityKind::MenuItems);
    assert_eq!(a_menu.slug(), "a");
    assert_eq!(a_menu.count(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn crud_through_accessor() {
    let fx = fixture(&[("a", Plan::Premium)]).await;
    let tickets = fx.tenancy.get_accessor("a", "kitchen").await.unwrap();

    let t = tickets
        .create(&doc(json!({"table": 4, "status": "queued"})))
        .await
        .unwrap();
    let id = uuid::Uuid::parse_str(t["id"].as_str().unwrap()).unwrap();
    assert!(t["created_at"].is_string());

    let updated = tickets
        .update(id, &doc(json!({"status": "cooking"})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated["status"], "cooking");
    assert_eq!(updated["table"], 4);

    let cooking = tickets
        .find_one(&[("status".to_string(), json!("cooking"))])
        .await
        .unwrap();
    assert_eq!(cooking.unwrap()["id"], t["id"]);

    assert!(tickets.delete(id).await.unwrap().is_some());
    assert!(tickets.delete(id).await.unwrap().is_none());
}

#[tokio::test]
async fn restricted_accessor_denies_writes() {
    let fx = fixture(&[("a", Plan::Basic)]).await;
    let orders = fx.tenancy.get_accessor("a", "orders").await.unwrap();
    let read_only = orders.read_only();
    assert_eq!(read_only.count(&[]).await.unwrap(), 0);

    let err = read_only.create(&doc(json!({"total": 1}))).await.unwrap_err();
    assert!(matches!(
        err,
        TenantError::CapabilityDenied {
            capability: Capability::Create,
            ..
        }
    ));

    // restrict never widens
    let widened = read_only.restrict(CapabilitySet::full());
    assert!(!widened.capabilities().contains(Capability::Delete));
}

#[tokio::test]
async fn unreachable_tenant_is_retryable() {
    let fx = fixture(&[("a", Plan::Basic)]).await;
    fx.backend.inject_fault("a", Fault::EstablishFails("timeout".into()));
    let err = fx.tenancy.get_accessor("a", "users").await.unwrap_err();
    assert!(matches!(err, TenantError::TenantUnavailable { .. }));
    assert!(err.is_retryable());

    fx.backend.clear_fault("a");
    assert!(fx.tenancy.get_accessor("a", "users").await.is_ok());
}

#[tokio::test]
async fn query_failures_surface_as_storage_errors() {
    let fx = fixture(&[("a", Plan::Basic)]).await;
    let users = fx.tenancy.get_accessor("a", "users").await.unwrap();
    fx.backend.inject_fault("a", Fault::QueryFails("disk full".into()));
    let err = users.count(&[]).await.unwrap_err();
    assert!(matches!(err, TenantError::Storage { kind: EntityKind::Users, .. }));
    assert!(err.is_retryable());
}

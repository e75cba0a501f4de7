mod common;

use common::{doc, fixture, menu_items, orders};
use serde_json::json;
use tenancy_sdk::{
    update_plan_limits, EntityKind, Limit, Plan, PlanLimitsUpdate, Resource, Setting, SettingCategory, SettingsStore,
    TenantError,
};
use uuid::Uuid;

#[tokio::test]
async fn pizza_place_menu_quota() {
    let fx = fixture(&[("pizza-place", Plan::Basic)]).await;
    fx.backend.seed("pizza-place", EntityKind::MenuItems, menu_items(50));
    let dish = doc(json!({"name": "Calzone", "price": 12.0}));

    let err = fx
        .tenancy
        .create_record("pizza-place", EntityKind::MenuItems, &dish)
        .await
        .unwrap_err();
    match err {
        TenantError::QuotaExceeded {
            resource,
            usage,
            limit,
            plan,
            ..
        } => {
            assert_eq!(resource, Resource::MenuItems);
            assert_eq!(plan, Plan::Basic);
            assert_eq!(usage, 50);
            assert_eq!(limit, 50);
        }
        other => panic!("expected quota error, got {other}"),
    }
    assert_eq!(fx.backend.record_count("pizza-place", EntityKind::MenuItems), 50);

    let menu = fx.tenancy.get_accessor("pizza-place", "menu").await.unwrap();
    let oldest = menu.find(&[], Some(1), Some(49)).await.unwrap();
    let id = Uuid::parse_str(oldest[0]["id"].as_str().unwrap()).unwrap();
    menu.delete(id).await.unwrap();
    assert_eq!(menu.count(&[]).await.unwrap(), 49);

    let created = fx
        .tenancy
        .limiter()
        .create_within_quota("pizza-place", Resource::MenuItems, &dish)
        .await
        .unwrap();
    assert_eq!(created["name"], "Calzone");
    assert_eq!(menu.count(&[]).await.unwrap(), 50);

    let report = fx.tenancy.evaluate_usage("pizza-place").await.unwrap();
    assert_eq!(report.usage.menu_items, 50);
    assert!(!report.over_limits.menu_items);
}

#[tokio::test]
async fn equality_is_not_over_the_limit() {
    let fx = fixture(&[("trial-cafe", Plan::Trial)]).await;
    fx.backend.seed("trial-cafe", EntityKind::Orders, orders(&[1.0; 5]));

    let at_limit = fx.tenancy.evaluate_usage("trial-cafe").await.unwrap();
    assert_eq!(at_limit.usage.orders, 5);
    assert_eq!(at_limit.limits.orders, Limit::Limited(5));
    assert!(!at_limit.over_limits.orders);

    fx.backend.seed("trial-cafe", EntityKind::Orders, orders(&[1.0]));
    let above = fx.tenancy.evaluate_usage("trial-cafe").await.unwrap();
    assert!(above.over_limits.orders);
    assert!(!above.over_limits.users);
}

#[tokio::test]
async fn unlimited_sentinel_never_violates() {
    let fx = fixture(&[("big-diner", Plan::Trial)]).await;
    update_plan_limits(
        &fx.settings,
        Plan::Trial,
        PlanLimitsUpdate {
            orders: Some(Limit::Unlimited),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    fx.backend.seed("big-diner", EntityKind::Orders, orders(&[2.0; 40]));

    let report = fx.tenancy.evaluate_usage("big-diner").await.unwrap();
    assert_eq!(report.limits.orders, Limit::Unlimited);
    assert!(!report.over_limits.orders);
    assert!(fx
        .tenancy
        .limiter()
        .ensure_capacity("big-diner", Resource::Orders)
        .await
        .is_ok());

    let wire = serde_json::to_value(&report).unwrap();
    assert_eq!(wire["limits"]["orders"], -1);
    assert_eq!(wire["overLimits"]["menuItems"], false);
}

#[tokio::test]
async fn limits_are_reread_on_every_evaluation() {
    let fx = fixture(&[("a", Plan::Basic)]).await;
    fx.backend.seed("a", EntityKind::Users, (0..4).map(|i| json!({ "email": format!("u{}@a.io", i) })));

    assert!(!fx.tenancy.evaluate_usage("a").await.unwrap().over_limits.users);

    fx.settings
        .put(Setting::new("PLAN_BASIC_USERS", json!(3), SettingCategory::PlanLimits))
        .await
        .unwrap();
    let report = fx.tenancy.evaluate_usage("a").await.unwrap();
    assert_eq!(report.limits.users, Limit::Limited(3));
    assert!(report.over_limits.users);
}

#[tokio::test]
async fn malformed_setting_falls_back_to_default() {
    let fx = fixture(&[("a", Plan::Premium)]).await;
    fx.settings
        .put(Setting::new("PLAN_PREMIUM_ORDERS", json!("lots"), SettingCategory::PlanLimits))
        .await
        .unwrap();
    let limits = fx.tenancy.limiter().resolve_limits(Plan::Premium).await.unwrap();
    assert_eq!(limits.orders, Limit::Limited(2000));
}

#[tokio::test]
async fn zero_limit_is_honoured() {
    let fx = fixture(&[("a", Plan::Trial)]).await;
    fx.settings
        .put(Setting::new("PLAN_TRIAL_USERS", json!(0), SettingCategory::PlanLimits))
        .await
        .unwrap();
    let err = fx
        .tenancy
        .limiter()
        .ensure_capacity("a", Resource::Users)
        .await
        .unwrap_err();
    assert!(matches!(err, TenantError::QuotaExceeded { usage: 0, limit: 0, .. }));
}

#[tokio::test]
async fn untracked_kinds_skip_the_gate() {
    let fx = fixture(&[("a", Plan::Trial)]).await;
    fx.settings
        .put(Setting::new("PLAN_TRIAL_ORDERS", json!(0), SettingCategory::PlanLimits))
        .await
        .unwrap();
    let stock = doc(json!({"sku": "flour", "qty": 20}));
    assert!(fx
        .tenancy
        .create_record("a", EntityKind::Inventory, &stock)
        .await
        .is_ok());
}

#[tokio::test]
async fn inactive_tenant_has_no_usage() {
    let fx = fixture(&[("a", Plan::Basic)]).await;
    fx.registry.set_active("a", false);
    let err = fx.tenancy.evaluate_usage("a").await.unwrap_err();
    assert!(matches!(err, TenantError::TenantNotFound { .. }));
}

#[tokio::test]
async fn all_plans_have_effective_limits() {
    let fx = fixture(&[]).await;
    update_plan_limits(
        &fx.settings,
        Plan::Enterprise,
        PlanLimitsUpdate {
            users: Some(Limit::Limited(75)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let all = fx.tenancy.limiter().all_plan_limits().await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[&Plan::Enterprise].users, Limit::Limited(75));
    assert_eq!(all[&Plan::Trial].menu_items, Limit::Limited(5));
}

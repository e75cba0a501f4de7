//! Live usage against plan limits. Limits are read from the settings store on every call.

use crate::error::TenantError;
use crate::factory::ModelFactory;
use crate::limits::{compare, setting_key, Limit, OverLimits, PlanLimits, Resource, UsageSnapshot};
use crate::settings::SettingsStore;
use crate::tenant::Plan;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub slug: String,
    pub plan: Plan,
    pub usage: UsageSnapshot,
    pub limits: PlanLimits,
    pub over_limits: OverLimits,
}

#[derive(Clone)]
pub struct UsageLimiter {
    factory: ModelFactory,
    settings: Arc<dyn SettingsStore>,
}

impl UsageLimiter {
    pub fn new(factory: ModelFactory, settings: Arc<dyn SettingsStore>) -> Self {
        UsageLimiter { factory, settings }
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    /// Counts of orders, users and menu items, queried concurrently.
    pub async fn compute_usage(&self, slug: &str) -> Result<UsageSnapshot, TenantError> {
        let orders = self.factory.accessor(slug, Resource::Orders.entity_kind()).await?;
        let users = orders.sibling(Resource::Users.entity_kind());
        let menu_items = orders.sibling(Resource::MenuItems.entity_kind());
        let (orders, users, menu_items) =
            tokio::try_join!(orders.count(&[]), users.count(&[]), menu_items.count(&[]))?;
        Ok(UsageSnapshot {
            orders,
            users,
            menu_items,
        })
    }

    /// Effective limits of `plan`: settings overrides over built-in defaults.
    pub async fn resolve_limits(&self, plan: Plan) -> Result<PlanLimits, TenantError> {
        let mut limits = PlanLimits::defaults(plan);
        for resource in Resource::ALL {
            let key = setting_key(plan, resource);
            let Some(setting) = self.settings.get(&key).await? else {
                continue;
            };
            match Limit::from_setting(&setting.value) {
                Some(limit) => limits.set(resource, limit),
                None => tracing::warn!(
                    key = %key,
                    value = %setting.value,
                    "malformed plan limit setting, using default"
                ),
            }
        }
        Ok(limits)
    }

    pub async fn all_plan_limits(&self) -> Result<BTreeMap<Plan, PlanLimits>, TenantError> {
        let mut out = BTreeMap::new();
        for plan in Plan::ALL {
            out.insert(plan, self.resolve_limits(plan).await?);
        }
        Ok(out)
    }

    /// Usage, limits and which resources are strictly above their limit.
    pub async fn evaluate(&self, slug: &str) -> Result<UsageReport, TenantError> {
        let tenant = self.factory.active_tenant(slug).await?;
        let (usage, limits) = tokio::try_join!(
            self.compute_usage(slug),
            self.resolve_limits(tenant.subscription_plan)
        )?;
        let over_limits = compare(&usage, &limits);
        if over_limits.any() {
            tracing::info!(slug, plan = %tenant.subscription_plan, ?over_limits, "tenant over plan limits");
        }
        Ok(UsageReport {
            slug: slug.to_string(),
            plan: tenant.subscription_plan,
            usage,
            limits,
            over_limits,
        })
    }

    /// Gate for adding one `resource` item: rejects when usage + 1 would exceed the limit.
    /// Not atomic with the write that follows; concurrent writers can overshoot.
    pub async fn ensure_capacity(&self, slug: &str, resource: Resource) -> Result<(), TenantError> {
        let tenant = self.factory.active_tenant(slug).await?;
        let plan = tenant.subscription_plan;
        let Limit::Limited(limit) = self.resolve_limits(plan).await?.get(resource) else {
            return Ok(());
        };
        let usage = self
            .factory
            .accessor(slug, resource.entity_kind())
            .await?
            .count(&[])
            .await?;
        if usage + 1 > limit {
            tracing::info!(slug, %plan, %resource, usage, limit, "quota exceeded");
            return Err(TenantError::QuotaExceeded {
                slug: slug.to_string(),
                plan,
                resource,
                usage,
                limit,
            });
        }
        Ok(())
    }

    pub async fn create_within_quota(
        &self,
        slug: &str,
        resource: Resource,
        body: &HashMap<String, Value>,
    ) -> Result<Value, TenantError> {
        self.ensure_capacity(slug, resource).await?;
        self.factory
            .accessor(slug, resource.entity_kind())
            .await?
            .create(body)
            .await
    }
}

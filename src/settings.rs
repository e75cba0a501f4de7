//! Shared key/value settings (control plane). Plan-limit overrides live here.

use crate::error::TenantError;
use crate::limits::{setting_key, Limit, PlanLimits, Resource};
use crate::store::qualified_control_table;
use crate::tenant::Plan;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingCategory {
    System,
    Email,
    Payment,
    Security,
    General,
    PlanLimits,
}

impl SettingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingCategory::System => "SYSTEM",
            SettingCategory::Email => "EMAIL",
            SettingCategory::Payment => "PAYMENT",
            SettingCategory::Security => "SECURITY",
            SettingCategory::General => "GENERAL",
            SettingCategory::PlanLimits => "PLAN_LIMITS",
        }
    }

    /// Unknown stored categories read as `General`.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "SYSTEM" => SettingCategory::System,
            "EMAIL" => SettingCategory::Email,
            "PAYMENT" => SettingCategory::Payment,
            "SECURITY" => SettingCategory::Security,
            "PLAN_LIMITS" => SettingCategory::PlanLimits,
            _ => SettingCategory::General,
        }
    }
}

impl fmt::Display for SettingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub key: String,
    pub value: Value,
    pub category: SettingCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Setting {
    pub fn new(key: impl Into<String>, value: Value, category: SettingCategory) -> Self {
        Setting {
            key: key.into(),
            value,
            category,
            description: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Setting>, TenantError>;

    /// Insert or replace by key. A missing description keeps the stored one.
    async fn put(&self, setting: Setting) -> Result<Setting, TenantError>;

    async fn delete(&self, key: &str) -> Result<bool, TenantError>;

    /// Ordered by category, then key.
    async fn list(&self) -> Result<Vec<Setting>, TenantError>;
}

#[derive(Clone, Default)]
pub struct MemorySettingsStore {
    by_key: Arc<RwLock<BTreeMap<String, Setting>>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        MemorySettingsStore::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Setting>, TenantError> {
        Ok(self.by_key.read().get(key).cloned())
    }

    async fn put(&self, mut setting: Setting) -> Result<Setting, TenantError> {
        let mut by_key = self.by_key.write();
        if setting.description.is_none() {
            setting.description = by_key.get(&setting.key).and_then(|s| s.description.clone());
        }
        setting.updated_at = Utc::now();
        by_key.insert(setting.key.clone(), setting.clone());
        Ok(setting)
    }

    async fn delete(&self, key: &str) -> Result<bool, TenantError> {
        Ok(self.by_key.write().remove(key).is_some())
    }

    async fn list(&self) -> Result<Vec<Setting>, TenantError> {
        let mut all: Vec<Setting> = self.by_key.read().values().cloned().collect();
        sort_settings(&mut all);
        Ok(all)
    }
}

/// Category in declaration order, then key.
fn sort_settings(all: &mut [Setting]) {
    all.sort_by(|a, b| (a.category, &a.key).cmp(&(b.category, &b.key)));
}

fn list_sql() -> String {
    format!(
        "SELECT key, value, category, description, updated_at FROM {}",
        qualified_control_table("settings")
    )
}

type SettingRow = (String, Value, String, Option<String>, DateTime<Utc>);

fn setting_from_row((key, value, category, description, updated_at): SettingRow) -> Setting {
    Setting {
        key,
        value,
        category: SettingCategory::parse_lenient(&category),
        description,
        updated_at,
    }
}

/// Settings in the control-plane `settings` table.
#[derive(Clone)]
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        PgSettingsStore { pool }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Setting>, TenantError> {
        let sql = format!(
            "SELECT key, value, category, description, updated_at FROM {} WHERE key = $1",
            qualified_control_table("settings")
        );
        let row = sqlx::query_as::<_, SettingRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(setting_from_row))
    }

    async fn put(&self, setting: Setting) -> Result<Setting, TenantError> {
        let sql = format!(
            r#"
            INSERT INTO {} AS s (key, value, category, description, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                category = EXCLUDED.category,
                description = COALESCE(EXCLUDED.description, s.description),
                updated_at = NOW()
            RETURNING key, value, category, description, updated_at
            "#,
            qualified_control_table("settings")
        );
        let row = sqlx::query_as::<_, SettingRow>(&sql)
            .bind(&setting.key)
            .bind(&setting.value)
            .bind(setting.category.as_str())
            .bind(&setting.description)
            .fetch_one(&self.pool)
            .await?;
        Ok(setting_from_row(row))
    }

    async fn delete(&self, key: &str) -> Result<bool, TenantError> {
        let sql = format!("DELETE FROM {} WHERE key = $1", qualified_control_table("settings"));
        let done = sqlx::query(&sql).bind(key).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<Setting>, TenantError> {
        let rows = sqlx::query_as::<_, SettingRow>(&list_sql()).fetch_all(&self.pool).await?;
        let mut all: Vec<Setting> = rows.into_iter().map(setting_from_row).collect();
        sort_settings(&mut all);
        Ok(all)
    }
}

fn plan_limit_description(plan: Plan, resource: Resource) -> String {
    let what = match resource {
        Resource::Orders => "order limit",
        Resource::Users => "user limit",
        Resource::MenuItems => "menu items limit",
    };
    let name = plan.as_str();
    let mut chars = name.chars();
    let title: String = chars
        .next()
        .map(|c| c.to_uppercase().chain(chars).collect())
        .unwrap_or_default();
    format!("{} plan {}", title, what)
}

/// Application defaults plus the built-in limit of every plan.
pub fn default_settings() -> Vec<Setting> {
    use SettingCategory::{Email, Payment, Security, System};
    let mut out = vec![
        Setting::new("APP_NAME", json!("Restaurant SaaS"), System).with_description("Application name"),
        Setting::new("MAINTENANCE_MODE", json!(false), System).with_description("Enable maintenance mode"),
        Setting::new("MAX_RESTAURANTS", json!(1000), System).with_description("Maximum number of restaurants"),
        Setting::new("TRIAL_DAYS", json!(30), System).with_description("Trial period in days"),
        Setting::new("SMTP_HOST", json!(""), Email).with_description("SMTP server host"),
        Setting::new("SMTP_PORT", json!(587), Email).with_description("SMTP server port"),
        Setting::new("SMTP_USER", json!(""), Email).with_description("SMTP username"),
        Setting::new("SUPPORT_EMAIL", json!("support@restaurantsaas.com"), Email)
            .with_description("Support email address"),
        Setting::new("STRIPE_ENABLED", json!(false), Payment).with_description("Enable Stripe payments"),
        Setting::new("PAYPAL_ENABLED", json!(false), Payment).with_description("Enable PayPal payments"),
        Setting::new("SESSION_TIMEOUT", json!(24), Security).with_description("Session timeout in hours"),
        Setting::new("PASSWORD_MIN_LENGTH", json!(6), Security).with_description("Minimum password length"),
    ];
    for plan in Plan::ALL {
        let limits = PlanLimits::defaults(plan);
        for resource in Resource::ALL {
            out.push(
                Setting::new(setting_key(plan, resource), json!(limits.get(resource).to_i64()), SettingCategory::PlanLimits)
                    .with_description(plan_limit_description(plan, resource)),
            );
        }
    }
    out
}

/// Insert defaults whose key is absent. Existing values are left alone. Returns the number inserted.
pub async fn seed_default_settings(store: &dyn SettingsStore) -> Result<usize, TenantError> {
    let mut inserted = 0;
    for setting in default_settings() {
        if store.get(&setting.key).await?.is_none() {
            store.put(setting).await?;
            inserted += 1;
        }
    }
    tracing::info!(inserted, "default settings seeded");
    Ok(inserted)
}

/// Partial plan-limit change; absent fields keep their current value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimitsUpdate {
    #[serde(default)]
    pub orders: Option<Limit>,
    #[serde(default)]
    pub users: Option<Limit>,
    #[serde(default)]
    pub menu_items: Option<Limit>,
}

impl PlanLimitsUpdate {
    fn entries(&self) -> Vec<(Resource, Limit)> {
        [
            (Resource::Orders, self.orders),
            (Resource::Users, self.users),
            (Resource::MenuItems, self.menu_items),
        ]
        .into_iter()
        .filter_map(|(r, l)| l.map(|l| (r, l)))
        .collect()
    }
}

/// Upsert the plan-limit keys present in `update`. Takes effect on the next evaluation.
pub async fn update_plan_limits(
    store: &dyn SettingsStore,
    plan: Plan,
    update: PlanLimitsUpdate,
) -> Result<Vec<Setting>, TenantError> {
    let entries = update.entries();
    if entries.is_empty() {
        return Err(TenantError::Validation("no plan limits given".into()));
    }
    let mut written = Vec::with_capacity(entries.len());
    for (resource, limit) in entries {
        let setting = Setting::new(
            setting_key(plan, resource),
            json!(limit.to_i64()),
            SettingCategory::PlanLimits,
        )
        .with_description(plan_limit_description(plan, resource));
        written.push(store.put(setting).await?);
    }
    tracing::info!(plan = %plan, keys = written.len(), "plan limits updated");
    Ok(written)
}

//! Plan resource limits and usage comparison.

use crate::entity::EntityKind;
use crate::tenant::Plan;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Quota-tracked resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resource {
    Orders,
    Users,
    MenuItems,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Orders, Resource::Users, Resource::MenuItems];

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Resource::Orders => EntityKind::Orders,
            Resource::Users => EntityKind::Users,
            Resource::MenuItems => EntityKind::MenuItems,
        }
    }

    /// Resource counted for writes to `kind`, if any.
    pub fn for_kind(kind: EntityKind) -> Option<Resource> {
        Resource::ALL.into_iter().find(|r| r.entity_kind() == kind)
    }

    fn setting_suffix(&self) -> &'static str {
        match self {
            Resource::Orders => "ORDERS",
            Resource::Users => "USERS",
            Resource::MenuItems => "MENU_ITEMS",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Orders => "orders",
            Resource::Users => "users",
            Resource::MenuItems => "menuItems",
        })
    }
}

/// Settings key holding the limit of `resource` on `plan` (e.g. `PLAN_BASIC_MENU_ITEMS`).
pub fn setting_key(plan: Plan, resource: Resource) -> String {
    format!("PLAN_{}_{}", plan.as_str().to_uppercase(), resource.setting_suffix())
}

/// A resource ceiling. Serialized as a number, `-1` meaning unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    Limited(u64),
    Unlimited,
}

impl Limit {
    pub const UNLIMITED_SENTINEL: i64 = -1;

    /// Parse a stored setting: integer `>= 0` or `-1`. Numeric strings are accepted.
    pub fn from_setting(value: &Value) -> Option<Limit> {
        let n = match value {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        Limit::from_i64(n)
    }

    pub fn from_i64(n: i64) -> Option<Limit> {
        match n {
            Limit::UNLIMITED_SENTINEL => Some(Limit::Unlimited),
            n if n >= 0 => Some(Limit::Limited(n as u64)),
            _ => None,
        }
    }

    pub fn to_i64(&self) -> i64 {
        match self {
            Limit::Limited(n) => *n as i64,
            Limit::Unlimited => Limit::UNLIMITED_SENTINEL,
        }
    }

    /// Usage strictly above the limit. Equality is not a violation.
    pub fn exceeded_by(&self, usage: u64) -> bool {
        match self {
            Limit::Limited(n) => usage > *n,
            Limit::Unlimited => false,
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.to_i64())
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = i64::deserialize(deserializer)?;
        Limit::from_i64(n).ok_or_else(|| serde::de::Error::custom(format!("invalid limit {} (use -1 for unlimited)", n)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub orders: Limit,
    pub users: Limit,
    pub menu_items: Limit,
}

impl PlanLimits {
    /// Built-in limits used when the settings store has no override.
    pub fn defaults(plan: Plan) -> Self {
        let (orders, users, menu_items) = match plan {
            Plan::Trial => (5, 2, 5),
            Plan::Basic => (500, 5, 50),
            Plan::Premium => (2000, 15, 200),
            Plan::Enterprise => (10000, 50, 1000),
        };
        PlanLimits {
            orders: Limit::Limited(orders),
            users: Limit::Limited(users),
            menu_items: Limit::Limited(menu_items),
        }
    }

    pub fn get(&self, resource: Resource) -> Limit {
        match resource {
            Resource::Orders => self.orders,
            Resource::Users => self.users,
            Resource::MenuItems => self.menu_items,
        }
    }

    pub fn set(&mut self, resource: Resource, limit: Limit) {
        match resource {
            Resource::Orders => self.orders = limit,
            Resource::Users => self.users = limit,
            Resource::MenuItems => self.menu_items = limit,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub orders: u64,
    pub users: u64,
    pub menu_items: u64,
}

impl UsageSnapshot {
    pub fn get(&self, resource: Resource) -> u64 {
        match resource {
            Resource::Orders => self.orders,
            Resource::Users => self.users,
            Resource::MenuItems => self.menu_items,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverLimits {
    pub orders: bool,
    pub users: bool,
    pub menu_items: bool,
}

impl OverLimits {
    pub fn any(&self) -> bool {
        self.orders || self.users || self.menu_items
    }

    pub fn get(&self, resource: Resource) -> bool {
        match resource {
            Resource::Orders => self.orders,
            Resource::Users => self.users,
            Resource::MenuItems => self.menu_items,
        }
    }
}

pub fn compare(usage: &UsageSnapshot, limits: &PlanLimits) -> OverLimits {
    OverLimits {
        orders: limits.orders.exceeded_by(usage.orders),
        users: limits.users.exceeded_by(usage.users),
        menu_items: limits.menu_items.exceeded_by(usage.menu_items),
    }
}

//! Entity kinds stored in every tenant namespace, and the capabilities an accessor may carry.

use crate::error::TenantError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of per-tenant collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Users,
    MenuItems,
    Orders,
    KitchenTickets,
    Inventory,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Users,
        EntityKind::MenuItems,
        EntityKind::Orders,
        EntityKind::KitchenTickets,
        EntityKind::Inventory,
    ];

    /// Collection (table) name inside a tenant namespace.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Users => "users",
            EntityKind::MenuItems => "menu_items",
            EntityKind::Orders => "orders",
            EntityKind::KitchenTickets => "kitchen_tickets",
            EntityKind::Inventory => "inventory",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "users" | "user" => Ok(EntityKind::Users),
            "menu_items" | "menu_item" | "menuitems" | "menu" | "menus" => Ok(EntityKind::MenuItems),
            "orders" | "order" => Ok(EntityKind::Orders),
            "kitchen_tickets" | "kitchen_ticket" | "kitchen" | "tickets" => Ok(EntityKind::KitchenTickets),
            "inventory" | "inventories" => Ok(EntityKind::Inventory),
            _ => Err(TenantError::UnknownEntityKind { kind: s.to_string() }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Create,
    Read,
    Update,
    Delete,
    Count,
    Aggregate,
}

impl Capability {
    fn bit(self) -> u8 {
        match self {
            Capability::Create => 1,
            Capability::Read => 1 << 1,
            Capability::Update => 1 << 2,
            Capability::Delete => 1 << 3,
            Capability::Count => 1 << 4,
            Capability::Aggregate => 1 << 5,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Create => "create",
            Capability::Read => "read",
            Capability::Update => "update",
            Capability::Delete => "delete",
            Capability::Count => "count",
            Capability::Aggregate => "aggregate",
        };
        f.write_str(s)
    }
}

/// Set of capabilities granted to an accessor.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub fn full() -> Self {
        CapabilitySet(0b11_1111)
    }

    /// Read, count and aggregate only.
    pub fn read_only() -> Self {
        Self::empty()
            .with(Capability::Read)
            .with(Capability::Count)
            .with(Capability::Aggregate)
    }

    pub fn empty() -> Self {
        CapabilitySet(0)
    }

    pub fn with(self, capability: Capability) -> Self {
        CapabilitySet(self.0 | capability.bit())
    }

    pub fn without(self, capability: Capability) -> Self {
        CapabilitySet(self.0 & !capability.bit())
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Capabilities present in both sets.
    pub fn intersect(self, other: CapabilitySet) -> Self {
        CapabilitySet(self.0 & other.0)
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let all = [
            Capability::Create,
            Capability::Read,
            Capability::Update,
            Capability::Delete,
            Capability::Count,
            Capability::Aggregate,
        ];
        f.debug_set()
            .entries(all.iter().filter(|c| self.contains(**c)))
            .finish()
    }
}

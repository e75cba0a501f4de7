//! Tenancy SDK: per-tenant data routing and plan quota enforcement for a multi-tenant
//! restaurant backend.

pub mod accessor;
pub mod backend;
pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod extractors;
pub mod factory;
pub mod handlers;
pub mod limits;
pub mod metrics;
pub mod response;
pub mod routes;
pub mod scanner;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;
pub mod tenancy;
pub mod tenant;
pub mod usage;

pub use accessor::EntityAccessor;
pub use backend::{Aggregate, Fault, MemoryBackend, PgBackend, ProvisionStatus, StorageBackend, TenantStore};
pub use cache::{CacheStats, ConnectionCache, TenantHandle};
pub use config::CoreConfig;
pub use entity::{Capability, CapabilitySet, EntityKind};
pub use error::{StorageError, TenantError};
pub use factory::ModelFactory;
pub use limits::{Limit, OverLimits, PlanLimits, Resource, UsageSnapshot};
pub use metrics::ApiMetrics;
pub use routes::app_router;
pub use scanner::{CrossTenantScanner, FirstMatch, ScanOptions, ScanReport, TenantAnalytics};
pub use settings::{
    default_settings, seed_default_settings, update_plan_limits, MemorySettingsStore, PgSettingsStore,
    PlanLimitsUpdate, Setting, SettingCategory, SettingsStore,
};
pub use state::AppState;
pub use store::{ensure_control_tables, ensure_database_exists};
pub use tenancy::{Onboarding, Tenancy};
pub use tenant::{
    load_registry_from_pool, normalize_slug, slugify, validate_slug, PgTenantDirectory, Plan, TenantDescriptor,
    TenantDirectory, TenantRegistry,
};
pub use usage::{UsageLimiter, UsageReport};

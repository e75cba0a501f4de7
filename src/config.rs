//! Runtime configuration read from the environment.

use crate::error::TenantError;
use crate::scanner::ScanOptions;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Control-plane database; tenant databases live on the same server.
    pub database_url: String,
    /// Tenant database name is this prefix followed by the slug with `-` replaced by `_`.
    pub tenant_database_prefix: String,
    pub tenant_max_connections: u32,
    pub tenant_acquire_timeout: Duration,
    pub scan_concurrency: usize,
    pub scan_tenant_timeout: Duration,
    pub bind_addr: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            database_url: "postgres://localhost/restaurant_control".into(),
            tenant_database_prefix: "tenant_".into(),
            tenant_max_connections: 5,
            tenant_acquire_timeout: Duration::from_millis(5000),
            scan_concurrency: 8,
            scan_tenant_timeout: Duration::from_millis(5000),
            bind_addr: "0.0.0.0:3000".into(),
        }
    }
}

impl CoreConfig {
    /// Read from process env; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, TenantError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TenantError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CoreConfig::default();
        Ok(CoreConfig {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            tenant_database_prefix: lookup("TENANT_DATABASE_PREFIX").unwrap_or(defaults.tenant_database_prefix),
            tenant_max_connections: parse_var(&lookup, "TENANT_POOL_MAX_CONNECTIONS")?
                .unwrap_or(defaults.tenant_max_connections),
            tenant_acquire_timeout: parse_var(&lookup, "TENANT_ACQUIRE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.tenant_acquire_timeout),
            scan_concurrency: parse_var(&lookup, "SCAN_CONCURRENCY")?.unwrap_or(defaults.scan_concurrency),
            scan_tenant_timeout: parse_var(&lookup, "SCAN_TENANT_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.scan_tenant_timeout),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            concurrency: self.scan_concurrency.max(1),
            tenant_timeout: self.scan_tenant_timeout,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, TenantError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| TenantError::Validation(format!("invalid {}: {}", key, raw))),
    }
}

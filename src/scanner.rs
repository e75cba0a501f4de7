//! Fan-out over every registered tenant with per-tenant failure isolation.
//!
//! Visits run through `buffer_unordered`, each under its own timeout. One tenant failing
//! or hanging never aborts the scan; it shows up as a failed entry in the report.

use crate::accessor::EntityAccessor;
use crate::backend::Aggregate;
use crate::entity::EntityKind;
use crate::error::TenantError;
use crate::factory::ModelFactory;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanOptions {
    /// Tenants visited at the same time. Treated as at least 1.
    pub concurrency: usize,
    /// Budget for one tenant, establishment included.
    pub tenant_timeout: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            concurrency: 8,
            tenant_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
pub struct ScanEntry<T> {
    pub slug: String,
    pub outcome: Result<T, TenantError>,
}

/// Per-tenant outcomes of one scan, in completion order.
#[derive(Debug)]
pub struct ScanReport<T> {
    kind: EntityKind,
    entries: Vec<ScanEntry<T>>,
}

impl<T> ScanReport<T> {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn entries(&self) -> &[ScanEntry<T>] {
        &self.entries
    }

    /// Tenants visited.
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn successes(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.as_ref().ok().map(|v| (e.slug.as_str(), v)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &TenantError)> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.as_ref().err().map(|err| (e.slug.as_str(), err)))
    }

    /// Sorted.
    pub fn failed_slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.failures().map(|(s, _)| s.to_string()).collect();
        slugs.sort();
        slugs
    }

    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_ok())
    }

    pub fn get(&self, slug: &str) -> Option<&Result<T, TenantError>> {
        self.entries.iter().find(|e| e.slug == slug).map(|e| &e.outcome)
    }

    pub fn into_map(self) -> HashMap<String, Result<T, TenantError>> {
        self.entries.into_iter().map(|e| (e.slug, e.outcome)).collect()
    }

    /// All values, or `PartialScanFailure` naming the failed tenants.
    pub fn into_result(self) -> Result<HashMap<String, T>, TenantError> {
        if !self.is_complete() {
            return Err(TenantError::PartialScanFailure {
                kind: self.kind,
                failed: self.failed_slugs(),
                total: self.total(),
            });
        }
        Ok(self
            .entries
            .into_iter()
            .filter_map(|e| e.outcome.ok().map(|v| (e.slug, v)))
            .collect())
    }
}

/// Outcome of an existence scan.
#[derive(Debug)]
pub struct FirstMatch<T> {
    pub found: Option<(String, T)>,
    /// Tenants that failed before the match (or all failures when nothing matched).
    pub failures: Vec<(String, TenantError)>,
    pub visited: usize,
}

impl<T> FirstMatch<T> {
    pub fn is_found(&self) -> bool {
        self.found.is_some()
    }

    pub fn unchecked_slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.failures.iter().map(|(s, _)| s.clone()).collect();
        slugs.sort();
        slugs
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantAnalytics {
    pub total_orders: u64,
    pub total_revenue: f64,
    pub menu_count: u64,
}

#[derive(Clone)]
pub struct CrossTenantScanner {
    factory: ModelFactory,
    options: ScanOptions,
}

impl CrossTenantScanner {
    pub fn new(factory: ModelFactory, options: ScanOptions) -> Self {
        CrossTenantScanner { factory, options }
    }

    pub fn options(&self) -> ScanOptions {
        self.options
    }

    /// Run `op` against a read-only accessor of every registered tenant, inactive ones included.
    /// Only a failure to list the directory is returned as `Err`.
    pub async fn scan<T, F, Fut>(&self, kind: EntityKind, op: F) -> Result<ScanReport<T>, TenantError>
    where
        F: Fn(EntityAccessor) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, TenantError>> + Send,
        T: Send,
    {
        let tenants = self.factory.directory().list_tenants().await?;
        let started = Instant::now();
        let entries: Vec<ScanEntry<T>> = stream::iter(tenants)
            .map(|t| self.visit(t.slug, kind, &op))
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;
        let report = ScanReport { kind, entries };
        tracing::debug!(
            kind = %kind,
            total = report.total(),
            failed = report.failures().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tenant scan finished"
        );
        Ok(report)
    }

    /// Existence mode: stops at the first tenant for which `op` yields `Some`, dropping visits in flight.
    pub async fn find_first<T, F, Fut>(&self, kind: EntityKind, op: F) -> Result<FirstMatch<T>, TenantError>
    where
        F: Fn(EntityAccessor) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Option<T>, TenantError>> + Send,
        T: Send,
    {
        let tenants = self.factory.directory().list_tenants().await?;
        let mut visits = stream::iter(tenants)
            .map(|t| self.visit(t.slug, kind, &op))
            .buffer_unordered(self.options.concurrency.max(1));
        let mut result = FirstMatch {
            found: None,
            failures: Vec::new(),
            visited: 0,
        };
        while let Some(entry) = visits.next().await {
            result.visited += 1;
            match entry.outcome {
                Ok(Some(value)) => {
                    result.found = Some((entry.slug, value));
                    break;
                }
                Ok(None) => {}
                Err(e) => result.failures.push((entry.slug, e)),
            }
        }
        Ok(result)
    }

    async fn visit<T, F, Fut>(&self, slug: String, kind: EntityKind, op: &F) -> ScanEntry<T>
    where
        F: Fn(EntityAccessor) -> Fut,
        Fut: Future<Output = Result<T, TenantError>>,
    {
        let started = Instant::now();
        let work = async {
            let accessor = self.factory.scan_accessor(&slug, kind).await?;
            op(accessor).await
        };
        let outcome = match tokio::time::timeout(self.options.tenant_timeout, work).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TenantError::Timeout {
                slug: slug.clone(),
                elapsed: started.elapsed(),
            }),
        };
        if let Err(e) = &outcome {
            tracing::warn!(slug = %slug, kind = %kind, error = %e, "tenant skipped in scan");
        }
        ScanEntry { slug, outcome }
    }

    /// Tenant holding a user with this email, compared ignoring case. An exact match on the
    /// trimmed address is tried as a fallback.
    pub async fn email_owner(&self, email: &str) -> Result<FirstMatch<Value>, TenantError> {
        let given = email.trim().to_string();
        self.find_first(EntityKind::Users, |users| {
            let given = given.clone();
            async move {
                if let Some(user) = users.find_one_ignore_case("email", &given).await? {
                    return Ok(Some(user));
                }
                users.find_one(&[("email".to_string(), Value::String(given))]).await
            }
        })
        .await
    }

    /// Order count, revenue (sum of order `total`) and menu size per tenant.
    pub async fn tenant_analytics(&self) -> Result<ScanReport<TenantAnalytics>, TenantError> {
        self.scan(EntityKind::Orders, |orders| async move {
            let menu = orders.sibling(EntityKind::MenuItems);
            let sum_totals = Aggregate::Sum { field: "total".into() };
            let (total_orders, revenue, menu_count) =
                tokio::try_join!(orders.count(&[]), orders.aggregate(&sum_totals), menu.count(&[]))?;
            Ok(TenantAnalytics {
                total_orders,
                total_revenue: revenue.as_f64().unwrap_or(0.0),
                menu_count,
            })
        })
        .await
    }
}

//! Database-per-tenant backend on PostgreSQL. Each tenant gets its own database and pool.

use super::{split_document, strip_reserved, Aggregate, ProvisionStatus, StorageBackend, TenantStore};
use crate::config::CoreConfig;
use crate::entity::EntityKind;
use crate::error::StorageError;
use crate::sql::{self, bind_scalar};
use crate::store::{ensure_database, is_missing_database, with_database};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PgBackend {
    base_url: String,
    db_prefix: String,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PgBackend {
    pub fn new(config: &CoreConfig) -> Self {
        PgBackend {
            base_url: config.database_url.clone(),
            db_prefix: config.tenant_database_prefix.clone(),
            max_connections: config.tenant_max_connections,
            acquire_timeout: config.tenant_acquire_timeout,
        }
    }

    /// Database name for a tenant: prefix plus slug with `-` replaced by `_`.
    pub fn database_name(&self, slug: &str) -> String {
        format!("{}{}", self.db_prefix, slug.replace('-', "_"))
    }

    fn tenant_options(&self, slug: &str) -> Result<PgConnectOptions, StorageError> {
        with_database(&self.base_url, &self.database_name(slug))
    }

    async fn connect(&self, options: PgConnectOptions) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_with(options)
            .await
    }
}

#[async_trait]
impl StorageBackend for PgBackend {
    async fn provision(&self, slug: &str) -> Result<ProvisionStatus, StorageError> {
        let options = self.tenant_options(slug)?;
        let created = ensure_database(&options).await?;
        let pool = self.connect(options).await?;
        for kind in EntityKind::ALL {
            for ddl in sql::create_collection(kind) {
                sqlx::query(&ddl).execute(&pool).await?;
            }
        }
        pool.close().await;
        let status = if created {
            ProvisionStatus::Created
        } else {
            ProvisionStatus::AlreadyExists
        };
        tracing::info!(slug, database = %self.database_name(slug), ?status, "tenant database provisioned");
        Ok(status)
    }

    async fn establish(&self, slug: &str) -> Result<Arc<dyn TenantStore>, StorageError> {
        let options = self.tenant_options(slug)?;
        let pool = self.connect(options).await.map_err(|e| {
            if is_missing_database(&e) {
                StorageError::NotProvisioned(slug.to_string())
            } else {
                StorageError::Unreachable(e.to_string())
            }
        })?;
        Ok(Arc::new(PgTenantStore {
            namespace: self.database_name(slug),
            pool,
        }))
    }
}

/// Collections of one tenant database.
pub struct PgTenantStore {
    namespace: String,
    pool: PgPool,
}

impl PgTenantStore {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_row(&self, q: sql::QueryBuf) -> Result<Option<Value>, StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(bind_scalar(sqlx::query_scalar::<_, Value>(&q.sql), &q.params)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn insert(&self, kind: EntityKind, body: &HashMap<String, Value>) -> Result<Value, StorageError> {
        let (id, doc) = split_document(body)?;
        let q = sql::insert(kind, id.unwrap_or_else(Uuid::new_v4), doc);
        self.fetch_row(q)
            .await?
            .ok_or_else(|| StorageError::Query("insert returned no row".into()))
    }

    async fn fetch(&self, kind: EntityKind, id: Uuid) -> Result<Option<Value>, StorageError> {
        self.fetch_row(sql::select_by_id(kind, id)).await
    }

    async fn find(
        &self,
        kind: EntityKind,
        filters: &[(String, Value)],
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Value>, StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        let q = sql::select_list(kind, filters, limit, offset);
        Ok(bind_scalar(sqlx::query_scalar::<_, Value>(&q.sql), &q.params)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn find_text_ignore_case(
        &self,
        kind: EntityKind,
        field: &str,
        value: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Value>, StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        let q = sql::select_text_ignore_case(kind, field, value, limit);
        Ok(bind_scalar(sqlx::query_scalar::<_, Value>(&q.sql), &q.params)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: Uuid,
        body: &HashMap<String, Value>,
    ) -> Result<Option<Value>, StorageError> {
        self.fetch_row(sql::update(kind, id, strip_reserved(body))).await
    }

    async fn delete(&self, kind: EntityKind, id: Uuid) -> Result<Option<Value>, StorageError> {
        self.fetch_row(sql::delete(kind, id)).await
    }

    async fn count(&self, kind: EntityKind, filters: &[(String, Value)]) -> Result<u64, StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        let q = sql::count(kind, filters);
        let n: i64 = bind_scalar(sqlx::query_scalar::<_, i64>(&q.sql), &q.params)
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn aggregate(&self, kind: EntityKind, op: &Aggregate) -> Result<Value, StorageError> {
        Ok(self.fetch_row(sql::aggregate(kind, op)).await?.unwrap_or(Value::Null))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_maps_dashes() {
        let backend = PgBackend::new(&CoreConfig::default());
        assert_eq!(backend.database_name("pizza-place"), "tenant_pizza_place");
        let options = backend.tenant_options("pizza-place").unwrap();
        assert_eq!(options.get_database(), Some("tenant_pizza_place"));
    }
}

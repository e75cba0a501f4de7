//! Control-plane DDL and database helpers. Control-plane tables live in a schema named from
//! `TENANCY_CONTROL_SCHEMA` env (default `control`).

use crate::error::StorageError;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;

/// Schema name for control-plane tables. Must be a valid PostgreSQL identifier.
pub fn control_schema() -> String {
    std::env::var("TENANCY_CONTROL_SCHEMA").unwrap_or_else(|_| "control".into())
}

/// Schema-qualified control-plane table name (e.g. "control.tenants").
pub fn qualified_control_table(table: &str) -> String {
    format!("{}.{}", control_schema(), table)
}

/// Create the control schema and its `tenants` and `settings` tables if missing.
pub async fn ensure_control_tables(pool: &PgPool) -> Result<(), StorageError> {
    let schema = control_schema();
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(pool)
        .await?;

    let tenants_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            slug TEXT PRIMARY KEY,
            name TEXT,
            admin_email TEXT,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            subscription_plan TEXT NOT NULL DEFAULT 'trial',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        qualified_control_table("tenants")
    );
    sqlx::query(&tenants_ddl).execute(pool).await?;

    let settings_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            key TEXT PRIMARY KEY,
            value JSONB NOT NULL,
            category TEXT NOT NULL DEFAULT 'GENERAL',
            description TEXT,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        qualified_control_table("settings")
    );
    sqlx::query(&settings_ddl).execute(pool).await?;
    Ok(())
}

/// Parse a PostgreSQL connection URL, query parameters included.
pub fn connect_options(url: &str) -> Result<PgConnectOptions, StorageError> {
    PgConnectOptions::from_str(url).map_err(|e| StorageError::Unreachable(format!("invalid database url: {}", e)))
}

/// Same server, credentials and parameters as `url`, pointing at database `db_name`.
pub fn with_database(url: &str, db_name: &str) -> Result<PgConnectOptions, StorageError> {
    Ok(connect_options(url)?.database(db_name))
}

/// Ensure the database in `database_url` exists; create it if not. Returns true when it was created.
pub async fn ensure_database_exists(database_url: &str) -> Result<bool, StorageError> {
    ensure_database(&connect_options(database_url)?).await
}

/// Connects to the `postgres` database on the same server to run CREATE DATABASE.
pub(crate) async fn ensure_database(target: &PgConnectOptions) -> Result<bool, StorageError> {
    let db_name = target.get_database().unwrap_or_default().to_string();
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(false);
    }
    let mut conn: PgConnection = target.clone().database("postgres").connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if exists.0 {
        return Ok(false);
    }
    sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
        .execute(&mut conn)
        .await?;
    Ok(true)
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLSTATE 3D000: the target database does not exist.
pub(crate) fn is_missing_database(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|c| c == "3D000")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_database_name() {
        let opts = with_database("postgres://u:p@localhost:5432/control", "tenant_pizza").unwrap();
        assert_eq!(opts.get_database(), Some("tenant_pizza"));
        assert_eq!(opts.get_host(), "localhost");
        assert_eq!(opts.get_port(), 5432);
        assert_eq!(opts.get_username(), "u");
    }

    #[test]
    fn slashes_in_query_string_are_not_the_database() {
        let opts = with_database(
            "postgres://u@db:5432/control?sslmode=require&sslrootcert=/etc/ssl/ca.pem",
            "tenant_a",
        )
        .unwrap();
        assert_eq!(opts.get_database(), Some("tenant_a"));
        assert_eq!(opts.get_host(), "db");
        assert!(matches!(opts.get_ssl_mode(), sqlx::postgres::PgSslMode::Require));
        assert!(format!("{:?}", opts).contains("/etc/ssl/ca.pem"));
    }

    #[test]
    fn rejects_unparseable_url() {
        assert!(matches!(
            with_database("not a url", "tenant_a"),
            Err(StorageError::Unreachable(_))
        ));
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("tenant_a"), "\"tenant_a\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}

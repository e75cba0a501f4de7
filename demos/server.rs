//! Demo server: control plane on Postgres, one database per tenant, tenant and admin routes.

use std::sync::Arc;
use tenancy_sdk::{
    app_router, ensure_control_tables, ensure_database_exists, seed_default_settings, AppState, CoreConfig,
    PgBackend, PgSettingsStore, PgTenantDirectory, Tenancy,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tenancy_sdk=info")),
        )
        .init();

    let config = CoreConfig::from_env()?;
    ensure_database_exists(&config.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    ensure_control_tables(&pool).await?;

    let settings = Arc::new(PgSettingsStore::new(pool.clone()));
    seed_default_settings(settings.as_ref()).await?;

    let tenancy = Tenancy::new(
        Arc::new(PgTenantDirectory::new(pool.clone())),
        Arc::new(PgBackend::new(&config)),
        settings,
        config.scan_options(),
    );
    let app = app_router(AppState::new(tenancy.clone()));

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    let closed = tenancy.shutdown().await;
    tracing::info!(closed, "tenant connections closed");
    pool.close().await;
    Ok(())
}

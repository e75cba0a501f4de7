//! Shared application state for all routes.

use crate::metrics::ApiMetrics;
use crate::tenancy::Tenancy;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub tenancy: Tenancy,
    pub metrics: Arc<ApiMetrics>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(tenancy: Tenancy) -> Self {
        AppState {
            tenancy,
            metrics: Arc::new(ApiMetrics::new()),
            started_at: Instant::now(),
        }
    }
}

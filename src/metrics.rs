//! Request counters injected into the router, reported by `/system/health`.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Response times kept for the running average.
pub const RESPONSE_WINDOW: usize = 100;

#[derive(Default)]
pub struct ApiMetrics {
    requests: AtomicU64,
    errors: AtomicU64,
    recent: Mutex<VecDeque<Duration>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMetricsSnapshot {
    pub total_requests: u64,
    pub error_count: u64,
    /// Percentage of responses with status >= 400.
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
}

impl ApiMetrics {
    pub fn new() -> Self {
        ApiMetrics::default()
    }

    pub fn record(&self, status: u16, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if status >= 400 {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        let mut recent = self.recent.lock();
        recent.push_back(elapsed);
        while recent.len() > RESPONSE_WINDOW {
            recent.pop_front();
        }
    }

    pub fn snapshot(&self) -> ApiMetricsSnapshot {
        let total_requests = self.requests.load(Ordering::Relaxed);
        let error_count = self.errors.load(Ordering::Relaxed);
        let error_rate = if total_requests > 0 {
            error_count as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };
        let recent = self.recent.lock();
        let avg_response_time_ms = if recent.is_empty() {
            0.0
        } else {
            recent.iter().map(|d| d.as_secs_f64() * 1000.0).sum::<f64>() / recent.len() as f64
        };
        ApiMetricsSnapshot {
            total_requests,
            error_count,
            error_rate,
            avg_response_time_ms,
        }
    }
}

/// Middleware recording status and latency of every request.
pub async fn track_api_metrics(State(metrics): State<Arc<ApiMetrics>>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    let elapsed = started.elapsed();
    metrics.record(response.status().as_u16(), elapsed);
    tracing::debug!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = elapsed.as_millis() as u64,
        "request"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rate_and_window() {
        let metrics = ApiMetrics::new();
        assert_eq!(metrics.snapshot().error_rate, 0.0);
        metrics.record(200, Duration::from_millis(10));
        metrics.record(404, Duration::from_millis(30));
        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.error_rate, 50.0);
        assert!((snap.avg_response_time_ms - 20.0).abs() < 1e-6);

        for _ in 0..RESPONSE_WINDOW {
            metrics.record(200, Duration::from_millis(1));
        }
        let snap = metrics.snapshot();
        assert!((snap.avg_response_time_ms - 1.0).abs() < 1e-6);
        assert_eq!(snap.total_requests, 2 + RESPONSE_WINDOW as u64);
    }
}

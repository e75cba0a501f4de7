//! Typed errors and HTTP mapping.

use crate::entity::{Capability, EntityKind};
use crate::limits::Resource;
use crate::tenant::Plan;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failures raised by a storage backend or a tenant namespace.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("namespace not provisioned: {0}")]
    NotProvisioned(String),
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("query: {0}")]
    Query(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("store closed")]
    Closed,
    #[error("establishment task: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum TenantError {
    #[error("tenant not found: {slug}")]
    TenantNotFound { slug: String },
    #[error("tenant unavailable: {slug}: {source}")]
    TenantUnavailable {
        slug: String,
        #[source]
        source: Arc<StorageError>,
    },
    #[error("unknown entity kind: {kind}")]
    UnknownEntityKind { kind: String },
    #[error("quota exceeded for {slug}: {resource} at {usage} of {limit} on {plan} plan")]
    QuotaExceeded {
        slug: String,
        plan: Plan,
        resource: Resource,
        usage: u64,
        limit: u64,
    },
    #[error("partial scan failure on {kind}: {} of {total} tenants failed", failed.len())]
    PartialScanFailure {
        kind: EntityKind,
        failed: Vec<String>,
        total: usize,
    },
    #[error("{capability} not allowed on {kind} accessor for {slug}")]
    CapabilityDenied {
        slug: String,
        kind: EntityKind,
        capability: Capability,
    },
    #[error("storage {slug}/{kind}: {source}")]
    Storage {
        slug: String,
        kind: EntityKind,
        #[source]
        source: StorageError,
    },
    #[error("tenant {slug} timed out after {elapsed:?}")]
    Timeout { slug: String, elapsed: Duration },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("control plane: {0}")]
    ControlPlane(#[source] StorageError),
}

impl From<sqlx::Error> for TenantError {
    fn from(e: sqlx::Error) -> Self {
        TenantError::ControlPlane(StorageError::Db(e))
    }
}

impl TenantError {
    /// Whether a later attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TenantError::TenantUnavailable { .. }
                | TenantError::Storage { .. }
                | TenantError::Timeout { .. }
                | TenantError::ControlPlane(_)
        )
    }

    /// Slug the error is about, when there is one.
    pub fn slug(&self) -> Option<&str> {
        match self {
            TenantError::TenantNotFound { slug }
            | TenantError::TenantUnavailable { slug, .. }
            | TenantError::QuotaExceeded { slug, .. }
            | TenantError::CapabilityDenied { slug, .. }
            | TenantError::Storage { slug, .. }
            | TenantError::Timeout { slug, .. } => Some(slug),
            _ => None,
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            TenantError::TenantNotFound { .. } => (StatusCode::NOT_FOUND, "tenant_not_found"),
            TenantError::TenantUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "tenant_unavailable"),
            TenantError::UnknownEntityKind { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "unknown_entity_kind"),
            TenantError::QuotaExceeded { .. } => (StatusCode::FORBIDDEN, "quota_exceeded"),
            TenantError::PartialScanFailure { .. } => (StatusCode::BAD_GATEWAY, "partial_scan_failure"),
            TenantError::CapabilityDenied { .. } => (StatusCode::METHOD_NOT_ALLOWED, "capability_denied"),
            TenantError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            TenantError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            TenantError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            TenantError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            TenantError::ControlPlane(_) => (StatusCode::INTERNAL_SERVER_ERROR, "control_plane_error"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            TenantError::QuotaExceeded {
                plan,
                resource,
                usage,
                limit,
                ..
            } => Some(serde_json::json!({
                "plan": plan,
                "resource": resource,
                "usage": usage,
                "limit": limit,
            })),
            TenantError::PartialScanFailure { failed, total, .. } => Some(serde_json::json!({
                "failed": failed,
                "total": total,
            })),
            _ => None,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for TenantError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        (status, Json(body)).into_response()
    }
}

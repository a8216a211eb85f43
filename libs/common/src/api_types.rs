//! Shared API envelope for gateway endpoints
//!
//! Failing JSON endpoints answer, through [`AppError`], with an
//! [`ErrorResponse`] carrying `{code, message, details}`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

// ============================================================================
// Response envelope
// ============================================================================

/// Standard error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorResponse {
    /// Always false
    #[serde(default = "crate::serde_helpers::bool_false")]
    pub success: bool,
    pub error: ErrorInfo,
}

/// Error payload inside [`ErrorResponse`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorInfo {
    /// HTTP status code
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 500,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

// ============================================================================
// AppError - HTTP error with status code (requires axum feature)
// ============================================================================

#[cfg(feature = "axum")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

/// Application error rendered as an [`ErrorResponse`]
#[cfg(feature = "axum")]
#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub error: ErrorInfo,
}

#[cfg(feature = "axum")]
impl AppError {
    pub fn new(status: StatusCode, error: ErrorInfo) -> Self {
        Self { status, error }
    }

    fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ErrorInfo::new(message).with_code(status.as_u16()),
        }
    }

    /// 400 Bad Request
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, message)
    }

    /// 401 Unauthorized
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, message)
    }

    /// 404 Not Found
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, message)
    }

    /// 413 Payload Too Large
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    /// 503 Service Unavailable
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.error = self.error.with_details(details);
        self
    }
}

#[cfg(feature = "axum")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                success: false,
                error: self.error,
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Service health
// ============================================================================

/// Body of the `/health` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct HealthStatus {
    pub status: ServiceStatus,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub checks: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of one component check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ComponentHealth {
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ComponentHealth {
    pub fn healthy(duration_ms: u64) -> Self {
        Self {
            status: ServiceStatus::Healthy,
            message: None,
            duration_ms: Some(duration_ms),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: ServiceStatus::Unhealthy,
            message: Some(message.into()),
            duration_ms: None,
        }
    }
}

impl HealthStatus {
    /// Overall status derived from the component checks
    pub fn from_checks(
        service: impl Into<String>,
        version: impl Into<String>,
        uptime_seconds: u64,
        checks: HashMap<String, ComponentHealth>,
    ) -> Self {
        let status = if checks.values().all(|c| c.status == ServiceStatus::Healthy) {
            ServiceStatus::Healthy
        } else if checks
            .values()
            .any(|c| c.status == ServiceStatus::Healthy)
        {
            ServiceStatus::Degraded
        } else {
            ServiceStatus::Unhealthy
        };

        Self {
            status,
            service: service.into(),
            version: version.into(),
            uptime_seconds,
            timestamp: chrono::Utc::now(),
            checks,
        }
    }
}

//! Health Check API Handlers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::Json};
use tracing::warn;

use crate::app_state::AppState;
use common::system_metrics::SystemSnapshot;
use common::{ComponentHealth, HealthStatus, ServiceStatus};

/// Health check endpoint
///
/// Reports the database check and the number of tracked devices.
///
/// @route GET /health
/// @status 503 - Every component check failed
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy or degraded", body = HealthStatus),
        (status = 503, description = "Service unhealthy", body = HealthStatus)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthStatus>) {
    let mut checks = HashMap::new();

    let started = Instant::now();
    let database = match state.store.ping().await {
        Ok(()) => ComponentHealth::healthy(started.elapsed().as_millis() as u64),
        Err(e) => {
            warn!("Health check: database unreachable: {}", e);
            ComponentHealth::unhealthy(e.to_string())
        },
    };
    checks.insert("database".to_string(), database);

    let mut sessions = ComponentHealth::healthy(0);
    sessions.message = Some(format!("{} devices tracked", state.manager.registry().len()));
    checks.insert("sessions".to_string(), sessions);

    let health = HealthStatus::from_checks(
        state.config.service.name.clone(),
        env!("CARGO_PKG_VERSION"),
        state.uptime_seconds(),
        checks,
    );
    let code = if health.status == ServiceStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(health))
}

/// Host CPU, memory and network figures
///
/// @route GET /api/system
#[utoipa::path(
    get,
    path = "/api/system",
    responses(
        (status = 200, description = "Host resource snapshot", body = serde_json::Value)
    ),
    tag = "system"
)]
pub async fn system_info() -> Json<SystemSnapshot> {
    Json(SystemSnapshot::collect().await)
}

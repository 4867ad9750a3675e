//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use core_kernel::{AdapterHealth, HealthCheckResult};

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<HealthCheckResult>,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: Vec::new(),
    })
}

/// Readiness check
///
/// Asks every adapter for its health. Any unhealthy adapter makes the
/// service unready (503); degraded adapters are reported but tolerated.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let adapters = &state.adapters;
    let (store, gateway, notifier, staff, visit_notes) = tokio::join!(
        adapters.billing_store.health_check(),
        adapters.gateway.health_check(),
        adapters.notifier.health_check(),
        adapters.staff.health_check(),
        adapters.visit_notes.health_check(),
    );
    let checks = vec![store, gateway, notifier, staff, visit_notes];

    let ready = checks
        .iter()
        .all(|c| !matches!(c.status, AdapterHealth::Unhealthy));
    let (status, label) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks,
        }),
    )
}

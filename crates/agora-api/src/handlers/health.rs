//! Health check handler.

use axum::Json;
use chrono::Utc;

use crate::dto::HealthResponse;

/// Liveness check. Deliberately consults no upstreams.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "agora-gateway",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

//! Agora Commerce Gateway API
//!
//! HTTP surface that AI agents use to browse a merchant's catalog, build
//! checkouts, and pay through the user's wallet.
//!
//! # API Structure
//!
//! ```text
//! /
//! ├── /health       - Liveness
//! ├── /products     - Catalog passthrough (public)
//! ├── /auth         - Pairing-code registration and session echo
//! ├── /checkout     - Cart lifecycle, completion, approval polling
//! ├── /qr           - Device-authorization QR images
//! └── /orders       - Order lookup
//! ```
//!
//! # Authentication Methods
//!
//! - **Session**: `X-Session-Id` header from a completed registration
//! - **Bearer Token**: wallet-issued token in the Authorization header
//! - **Guest**: no credentials; payment runs through device authorization

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::http::HeaderName;
use axum::Router;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use agora_session::SessionLayer;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Enable CORS for browser clients
    pub enable_cors: bool,
    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
    /// Enable request tracing
    pub enable_tracing: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
            enable_tracing: true,
        }
    }
}

/// Create the main gateway router with all middleware
pub fn create_router(state: Arc<AppState>, config: ApiConfig) -> Router {
    let registry = state.registry.clone();
    let mut router = routes::gateway_routes()
        .with_state(state)
        // Session resolution runs closest to the handlers
        .layer(SessionLayer::new(registry));

    // Add tracing
    if config.enable_tracing {
        router = router.layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");

                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        );
    }

    // Add request ID middleware, outermost so the trace span sees the id
    let x_request_id = HeaderName::from_static("x-request-id");
    router = router
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    // Add CORS
    if config.enable_cors {
        let cors = if config.cors_origins.contains(&"*".to_string()) {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(
                    config
                        .cors_origins
                        .iter()
                        .filter_map(|o| o.parse().ok())
                        .collect::<Vec<_>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PATCH,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
        };
        router = router.layer(cors);
    }

    router
}

/// Create a minimal router for testing
pub fn create_test_router(state: Arc<AppState>) -> Router {
    let registry = state.registry.clone();
    routes::gateway_routes()
        .with_state(state)
        .layer(SessionLayer::new(registry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_enables_middleware() {
        let config = ApiConfig::default();
        assert!(config.enable_cors);
        assert!(config.enable_tracing);
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
    }
}

//! API Routes
//!
//! Route definitions for all gateway endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::state::AppState;

/// Create the gateway routes
pub fn gateway_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Liveness
        .route("/health", get(handlers::health::health))
        // Catalog (public)
        .route("/products", get(handlers::catalog::browse_products))
        .route("/products/:product_id", get(handlers::catalog::get_product))
        // Registration and sessions
        .nest("/auth", auth_routes())
        // Checkout lifecycle
        .route("/checkout", post(handlers::checkout::create_checkout))
        .route(
            "/checkout/:session_id",
            get(handlers::checkout::get_checkout)
                .patch(handlers::checkout::update_checkout)
                .delete(handlers::checkout::cancel_checkout),
        )
        .route(
            "/checkout/:session_id/complete",
            post(handlers::checkout::complete_checkout),
        )
        // Approval polling
        .route(
            "/checkout/:session_id/step-up/:step_up_id",
            get(handlers::checkout::step_up_status),
        )
        .route(
            "/checkout/:session_id/payment-status/:request_id",
            get(handlers::checkout::payment_status),
        )
        // Device-authorization QR images
        .route("/qr/:request_id", get(handlers::checkout::qr_image))
        // Orders
        .route("/orders/:order_id", get(handlers::orders::get_order))
}

/// Registration routes
fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/status/:request_id", get(handlers::auth::registration_status))
        .route("/session", get(handlers::auth::current_session))
}

//! Checkout DTOs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use agora_checkout::CompletedOrder;
use agora_types::{CartItem, CheckoutSession};

// =============================================================================
// Create / Update
// =============================================================================

/// Create-checkout request body
///
/// `items` is optional so a missing array gets the validation message instead
/// of a serde rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequest {
    #[serde(default)]
    pub items: Option<Vec<CartItem>>,
}

/// A checkout session plus a hint about what to do next
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutEnvelope {
    #[serde(flatten)]
    pub session: CheckoutSession,
    pub next_step: &'static str,
}

/// Body returned when a checkout is cancelled
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutCancelled {
    /// Always `cancelled`
    pub status: &'static str,
    pub session_id: String,
    pub message: &'static str,
}

// =============================================================================
// Completion
// =============================================================================

/// 200 body for an immediately settled purchase
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseCompleted {
    /// Always `completed`
    pub status: &'static str,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub total: Decimal,
    pub currency: String,
    pub message: &'static str,
}

/// 202 body when the wallet demands in-app approval first
#[derive(Debug, Clone, Serialize)]
pub struct StepUpInstructions {
    /// Always `step_up_required`
    pub status: &'static str,
    pub step_up_id: String,
    pub message: &'static str,
    /// Where to poll for the approval decision
    pub poll_endpoint: String,
    pub amount: Decimal,
    pub currency: String,
}

/// 202 body when a guest must authorize through the device flow
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationInstructions {
    /// Always `authorization_required`
    pub status: &'static str,
    /// Deep link opening the wallet's approval screen
    pub authorization_url: String,
    /// Gateway-served QR image, absent when rendering failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_url: Option<String>,
    pub user_code: String,
    pub verification_uri: String,
    pub poll_endpoint: String,
    pub expires_in: u64,
    /// Whether the wallet pushed a notification to the user's device
    pub notification_sent: bool,
    pub message: String,
}

// =============================================================================
// Polling
// =============================================================================

/// Shared shape of both polling endpoints
///
/// All outcomes are HTTP 200; `status` carries the actual state. Order fields
/// appear only on `completed`, `expires_in` only on a pending device
/// authorization.
#[derive(Debug, Clone, Serialize)]
pub struct PollStatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    pub message: String,
}

impl PollStatusResponse {
    /// Status and message only.
    pub fn new(status: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            order_id: None,
            transaction_id: None,
            expires_in: None,
            message: message.into(),
        }
    }

    /// Terminal success carrying the settled order's identifiers.
    pub fn completed(completed: CompletedOrder, message: &'static str) -> Self {
        Self {
            status: "completed",
            order_id: Some(completed.order.id),
            transaction_id: completed.order.transaction_id,
            expires_in: None,
            message: message.to_string(),
        }
    }
}

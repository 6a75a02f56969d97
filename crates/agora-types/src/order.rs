use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::checkout::CartItem;

/// An order created by the store when a checkout completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Some store deployments name this field `order_id`; both are accepted.
    #[serde(alias = "order_id")]
    pub id: String,
    pub status: String,
    pub total: Decimal,
    pub currency: String,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle of a checkout session, owned by the store service.
///
/// The happy path is `CartBuilding -> ReadyForPayment -> AwaitingAuthorization
/// -> Completed`; `Cancelled` and `Expired` are the other terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    /// Items can still be added or changed; buyer details are incomplete.
    CartBuilding,
    /// Buyer and fulfillment are set; the session may be completed.
    ReadyForPayment,
    /// Payment authorization is in flight (step-up or device grant).
    AwaitingAuthorization,
    /// Payment captured and an order was created.
    Completed,
    /// Cancelled by the caller before completion.
    Cancelled,
    /// The session or its authorization window timed out.
    Expired,
}

impl CheckoutStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckoutStatus::Completed | CheckoutStatus::Cancelled | CheckoutStatus::Expired
        )
    }

    /// Whether the cart contents and buyer details may still be updated.
    pub fn is_mutable(&self) -> bool {
        matches!(
            self,
            CheckoutStatus::CartBuilding | CheckoutStatus::ReadyForPayment
        )
    }

    /// Wire name of the status, as it appears in JSON payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStatus::CartBuilding => "cart_building",
            CheckoutStatus::ReadyForPayment => "ready_for_payment",
            CheckoutStatus::AwaitingAuthorization => "awaiting_authorization",
            CheckoutStatus::Completed => "completed",
            CheckoutStatus::Cancelled => "cancelled",
            CheckoutStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line item in a cart. Only `product_id` and `quantity` are required on
/// input; the store fills in the name and pricing on its side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Decimal>,
}

impl CartItem {
    pub fn new(product_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            name: None,
            unit_price: None,
            total: None,
        }
    }
}

/// Cart contents with store-computed totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
}

/// Buyer contact details attached to a checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Buyer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentKind {
    Shipping,
    Pickup,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// How the order should be delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fulfillment {
    #[serde(rename = "type")]
    pub kind: FulfillmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// Merchant identity echoed on checkout sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

/// A checkout session as returned by the store service.
///
/// The store owns this record; anything the gateway keeps is a cache of a
/// response and never authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub status: CheckoutStatus,
    pub cart: Cart,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer: Option<Buyer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<Fulfillment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<Merchant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Partial update applied to a checkout session. Absent fields are left
/// untouched by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer: Option<Buyer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<Fulfillment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<CartItem>>,
}

impl CheckoutUpdate {
    pub fn is_empty(&self) -> bool {
        self.buyer.is_none() && self.fulfillment.is_none() && self.items.is_none()
    }
}

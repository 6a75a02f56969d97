//! Canonical domain types for Agora.
//!
//! Everything the gateway, the upstream clients, and the checkout
//! orchestration agree on lives here:
//!
//! - Merchant catalog types ([`Product`])
//! - Checkout sessions and carts ([`CheckoutSession`], [`Cart`], [`CheckoutUpdate`])
//! - Orders ([`Order`])
//! - Payment authorization types ([`SpendingLimits`], [`StepUpStatus`])
//! - Agent sessions ([`AuthSession`], [`SessionCredential`])
//!
//! Monetary amounts are [`rust_decimal::Decimal`] throughout and serialize
//! as plain JSON numbers, matching what the upstream services emit.

pub mod auth;
pub mod checkout;
pub mod order;
pub mod payment;
pub mod product;

pub use auth::{AgentIdentity, AuthSession, SessionCredential};
pub use checkout::{
    Address, Buyer, Cart, CartItem, CheckoutSession, CheckoutStatus, CheckoutUpdate, Fulfillment,
    FulfillmentKind, Merchant,
};
pub use order::Order;
pub use payment::{SpendingLimits, StepUpState, StepUpStatus};
pub use product::Product;

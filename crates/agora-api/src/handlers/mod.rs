//! API Handlers
//!
//! Request handlers for all gateway endpoints, one module per area.

pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod health;
pub mod orders;

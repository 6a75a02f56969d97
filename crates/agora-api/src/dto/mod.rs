//! Data Transfer Objects
//!
//! Request and response structures for the gateway API. The wire shapes are
//! what agent clients already parse, so field names and casing are stable.

pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod common;

pub use auth::*;
pub use catalog::*;
pub use checkout::*;
pub use common::*;

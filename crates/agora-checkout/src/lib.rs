//! Checkout orchestration for the Agora gateway.
//!
//! This crate drives a checkout session from cart to settled order across
//! the three ways a caller can be authenticated:
//!
//! - **Pre-registered sessions** spend against stored client credentials;
//!   within limits the purchase completes in one call, above them the
//!   wallet demands a step-up that is polled to resolution.
//! - **Bearer sessions** behave the same using the presented OAuth token.
//! - **Guests** are bounced through an RFC 8628 device authorization
//!   scoped to the exact checkout total, approved from the user's wallet
//!   app via deep link or QR code.
//!
//! [`CheckoutOrchestrator`] is the entry point; pending authorizations
//! live in a [`pending::PendingStore`] and every poll resolves against the
//! wallet service, never local state alone.

pub mod deeplink;
pub mod error;
pub mod limits;
pub mod pending;
pub mod poller;
pub mod qr;

mod orchestrator;

pub use error::{CheckoutError, CheckoutResult};
pub use limits::{evaluate, ExceededLimit, LimitDecision};
pub use orchestrator::{
    CallerAuth, CheckoutOrchestrator, CompletedOrder, CompletionOutcome, DeviceAuthChallenge,
    DeviceAuthPollOutcome, OrchestratorConfig, StepUpChallenge, StepUpPollOutcome,
};
pub use pending::{
    InMemoryPendingStore, PendingDeviceAuthorization, PendingStepUp, PendingStore,
};

//! Agent session resolution for the gateway.
//!
//! Two credential forms resolve to an [`agora_types::AuthSession`]:
//!
//! - an opaque session id (issued by this process after a pairing-code
//!   approval), presented in the `X-Session-Id` header and looked up directly;
//! - an OAuth bearer token, validated against the wallet's introspection
//!   endpoint and cached keyed by the raw token string for the token's own
//!   lifetime.
//!
//! The [`SessionLayer`] middleware resolves either form ahead of the
//! handlers. Requests without credentials pass through as guests; requests
//! with credentials that fail to resolve are rejected immediately.

pub mod middleware;
pub mod registry;
pub mod store;

pub use middleware::{OptionalSession, RequireSession, SessionLayer, SessionMiddleware, SESSION_HEADER};
pub use registry::{
    RegistrationReceipt, RegistrationStatus, RegistryConfig, SessionError, SessionRegistry,
};
pub use store::{InMemorySessionStore, SessionStore};

//! Application state shared across handlers.

use std::sync::Arc;

use agora_checkout::{CallerAuth, CheckoutOrchestrator};
use agora_session::SessionRegistry;
use agora_store::StoreClient;
use agora_types::{AuthSession, SessionCredential};

use crate::error::ApiError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Session minting and credential resolution
    pub registry: Arc<SessionRegistry>,
    /// Checkout and payment orchestration
    pub orchestrator: Arc<CheckoutOrchestrator>,
    /// Direct store access for the public catalog
    pub store: StoreClient,
    /// External base URL used when building absolute QR links
    pub public_base_url: Option<String>,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        orchestrator: Arc<CheckoutOrchestrator>,
        store: StoreClient,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            store,
            public_base_url,
        }
    }

    /// Absolute or relative URL under which the QR image for a pending
    /// authorization is served.
    pub fn qr_url(&self, request_id: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/qr/{request_id}", base.trim_end_matches('/')),
            None => format!("/qr/{request_id}"),
        }
    }

    /// Translate a resolved session (or its absence) into the caller posture
    /// the orchestrator acts under.
    pub fn caller_auth(&self, session: Option<&AuthSession>) -> Result<CallerAuth, ApiError> {
        let Some(session) = session else {
            return Ok(CallerAuth::Guest);
        };
        let wallet = self.registry.wallet_for(session)?;
        Ok(match session.credential {
            SessionCredential::ClientCredentials { .. } => CallerAuth::PreRegistered { wallet },
            SessionCredential::Bearer { .. } => CallerAuth::Bearer { wallet },
        })
    }
}

//! Session minting and credential resolution.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use uuid::Uuid;

use agora_types::{AgentIdentity, AuthSession, SessionCredential, SpendingLimits};
use agora_wallet::{
    AccessRequest, AccessRequestState, RequestedLimits, WalletClient, WalletConfig, WalletError,
};

use crate::store::{InMemorySessionStore, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown or expired session id")]
    UnknownSession,

    #[error("bearer token rejected by introspection")]
    InactiveToken,

    #[error("registration request not found")]
    UnknownRegistration,

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

/// Registry settings, including what a pairing-code registration asks the
/// wallet to grant.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub wallet: WalletConfig,
    /// Permissions requested for newly registered agents.
    pub registration_permissions: Vec<String>,
    /// Spending limits proposed for newly registered agents.
    pub registration_limits: RequestedLimits,
    /// Agent description used when the caller gives none.
    pub default_agent_description: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            wallet: WalletConfig::default(),
            registration_permissions: vec![
                "browse".to_string(),
                "cart".to_string(),
                "purchase".to_string(),
            ],
            registration_limits: RequestedLimits {
                per_transaction: Decimal::from(100),
                daily: Some(Decimal::from(500)),
                monthly: Some(Decimal::from(1000)),
                currency: "CAD".to_string(),
            },
            default_agent_description: "AI shopping assistant".to_string(),
        }
    }
}

/// Acknowledgement handed back when a registration is submitted.
#[derive(Debug, Clone)]
pub struct RegistrationReceipt {
    pub request_id: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Where a pairing-code registration currently stands.
#[derive(Debug, Clone)]
pub enum RegistrationStatus {
    Pending {
        time_remaining_seconds: Option<u64>,
    },
    /// The user approved; a session now exists under `session_id`.
    Approved {
        session_id: String,
        agent_id: String,
        permissions: Vec<String>,
        spending_limits: Option<SpendingLimits>,
    },
    Rejected,
}

struct PendingRegistration {
    expires_at: Option<DateTime<Utc>>,
}

struct CachedWallet {
    client: WalletClient,
    expires_at: Option<DateTime<Utc>>,
}

/// Resolves inbound credentials to sessions and mints new ones.
///
/// Pairing-code sessions are keyed by a gateway-issued opaque id; bearer
/// sessions are keyed by the raw token string so identical tokens always
/// resolve to the same cached record. Neither store outlives the process.
pub struct SessionRegistry {
    config: RegistryConfig,
    wallet: WalletClient,
    sessions: Arc<dyn SessionStore>,
    bearer_sessions: Arc<dyn SessionStore>,
    pending: DashMap<String, PendingRegistration>,
    wallet_cache: DashMap<String, CachedWallet>,
}

impl SessionRegistry {
    pub fn new(
        config: RegistryConfig,
        sessions: Arc<dyn SessionStore>,
        bearer_sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, SessionError> {
        let wallet = WalletClient::new(config.wallet.clone())?;
        Ok(Self {
            config,
            wallet,
            sessions,
            bearer_sessions,
            pending: DashMap::new(),
            wallet_cache: DashMap::new(),
        })
    }

    /// Registry backed by process-local maps.
    pub fn in_memory(config: RegistryConfig) -> Result<Self, SessionError> {
        Self::new(
            config,
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemorySessionStore::new()),
        )
    }

    /// Wallet client holding the gateway's own credentials.
    pub fn gateway_wallet(&self) -> &WalletClient {
        &self.wallet
    }

    /// Submit a pairing-code access request to the wallet.
    pub async fn register(
        &self,
        pairing_code: &str,
        agent_name: &str,
        agent_description: Option<&str>,
    ) -> Result<RegistrationReceipt, SessionError> {
        let request = AccessRequest {
            pairing_code: pairing_code.to_string(),
            agent_name: agent_name.to_string(),
            agent_description: agent_description
                .unwrap_or(&self.config.default_agent_description)
                .to_string(),
            permissions: self.config.registration_permissions.clone(),
            spending_limits: self.config.registration_limits.clone(),
        };

        let receipt = self.wallet.create_access_request(&request).await?;
        self.pending.insert(
            receipt.request_id.clone(),
            PendingRegistration {
                expires_at: receipt.expires_at,
            },
        );
        tracing::info!(request_id = %receipt.request_id, agent_name, "registration submitted");

        Ok(RegistrationReceipt {
            request_id: receipt.request_id,
            expires_at: receipt.expires_at,
        })
    }

    /// Poll a pending registration; approval mints the session.
    pub async fn registration_status(
        &self,
        request_id: &str,
    ) -> Result<RegistrationStatus, SessionError> {
        let expires_at = match self.pending.get(request_id) {
            Some(entry) => entry.expires_at,
            None => return Err(SessionError::UnknownRegistration),
        };
        if expires_at.is_some_and(|at| Utc::now() >= at) {
            self.pending.remove(request_id);
            return Err(SessionError::UnknownRegistration);
        }

        let status = self.wallet.get_access_request(request_id).await?;
        match status.status {
            AccessRequestState::Approved => {
                let Some(credentials) = status.credentials else {
                    // Approved without credentials cannot be acted on yet.
                    return Ok(RegistrationStatus::Pending {
                        time_remaining_seconds: status.time_remaining_seconds,
                    });
                };

                let session_id = new_session_id();
                let agent_id = status
                    .agent_id
                    .unwrap_or_else(|| format!("agent_{request_id}"));
                let session = AuthSession::pre_registered(
                    session_id.clone(),
                    credentials.client_id,
                    credentials.client_secret,
                    AgentIdentity {
                        agent_id: agent_id.clone(),
                        agent_name: None,
                    },
                );
                self.sessions.insert(session_id.clone(), session).await;
                self.pending.remove(request_id);
                tracing::info!(request_id, session_id = %session_id, agent_id = %agent_id, "registration approved");

                Ok(RegistrationStatus::Approved {
                    session_id,
                    agent_id,
                    permissions: status.permissions.unwrap_or_default(),
                    spending_limits: status.spending_limits,
                })
            }
            AccessRequestState::Rejected => {
                self.pending.remove(request_id);
                tracing::info!(request_id, "registration rejected by user");
                Ok(RegistrationStatus::Rejected)
            }
            AccessRequestState::Pending => Ok(RegistrationStatus::Pending {
                time_remaining_seconds: status.time_remaining_seconds,
            }),
        }
    }

    /// Resolve presented credentials to a session.
    ///
    /// The session id takes precedence; an unknown session id falls through
    /// to the bearer token when one was also presented.
    pub async fn resolve(
        &self,
        session_id: Option<&str>,
        bearer: Option<&str>,
    ) -> Result<AuthSession, SessionError> {
        if let Some(id) = session_id {
            match self.lookup_session(id).await {
                Some(session) => return Ok(session),
                None if bearer.is_none() => return Err(SessionError::UnknownSession),
                None => {}
            }
        }
        match bearer {
            Some(token) => self.resolve_bearer(token).await,
            None => Err(SessionError::UnknownSession),
        }
    }

    async fn lookup_session(&self, id: &str) -> Option<AuthSession> {
        let session = self.sessions.get(id).await?;
        if session.is_expired(Utc::now()) {
            self.sessions.remove(id).await;
            self.wallet_cache.remove(id);
            return None;
        }
        Some(session)
    }

    async fn resolve_bearer(&self, token: &str) -> Result<AuthSession, SessionError> {
        if let Some(session) = self.bearer_sessions.get(token).await {
            if !session.is_expired(Utc::now()) {
                return Ok(session);
            }
            // Past the exp claim the cache must not vouch for the token.
            self.bearer_sessions.remove(token).await;
            self.wallet_cache.remove(&session.id);
        }

        let introspection = self.wallet.introspect(token).await?;
        if !introspection.active {
            tracing::debug!("introspection reported inactive token");
            return Err(SessionError::InactiveToken);
        }

        let agent_id = introspection
            .sub
            .clone()
            .or_else(|| introspection.agent_id.clone())
            .unwrap_or_else(|| "oauth_agent".to_string());
        let session = AuthSession::bearer(
            format!("bearer_{}", Uuid::new_v4().simple()),
            token,
            AgentIdentity {
                agent_id,
                agent_name: None,
            },
            introspection.expires_at(),
        );
        self.bearer_sessions
            .insert(token.to_string(), session.clone())
            .await;
        tracing::debug!(session_id = %session.id, "minted bearer session");
        Ok(session)
    }

    /// A wallet client acting under the given session's credential.
    ///
    /// Clients are cached per session id; pairing-code sessions get a
    /// client-credentials client, bearer sessions a fixed-token one.
    pub fn wallet_for(&self, session: &AuthSession) -> Result<WalletClient, SessionError> {
        if let Some(cached) = self.wallet_cache.get(&session.id) {
            return Ok(cached.client.clone());
        }

        let client = match &session.credential {
            SessionCredential::ClientCredentials {
                client_id,
                client_secret,
            } => WalletClient::new(WalletConfig {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                ..self.config.wallet.clone()
            })?,
            SessionCredential::Bearer { token } => self.wallet.with_token(token.clone()),
        };

        self.wallet_cache.insert(
            session.id.clone(),
            CachedWallet {
                client: client.clone(),
                expires_at: session.expires_at,
            },
        );
        Ok(client)
    }

    /// Drop expired sessions and their cached wallet clients.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let removed = self.sessions.sweep_expired(now).await
            + self.bearer_sessions.sweep_expired(now).await;
        self.wallet_cache
            .retain(|_, cached| cached.expires_at.map_or(true, |at| now < at));
        if removed > 0 {
            tracing::debug!(removed, "swept expired sessions");
        }
        removed
    }
}

fn new_session_id() -> String {
    format!("sess_{}", Uuid::new_v4().simple())
}

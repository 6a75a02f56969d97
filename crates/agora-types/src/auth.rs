use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The agent behind a session, as reported by the wallet service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

/// The credential material backing a session. Exactly one form is present.
#[derive(Clone)]
pub enum SessionCredential {
    /// Long-lived client credentials issued through pairing-code approval.
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    /// An OAuth bearer token validated by introspection.
    Bearer { token: String },
}

// Secret material must never reach log output.
impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionCredential::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            SessionCredential::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// An authenticated agent session held in gateway memory.
///
/// Sessions are minted either when a pairing-code registration is approved
/// (client credentials) or when a bearer token first passes introspection
/// (synthetic session keyed by the raw token). They live for the process
/// lifetime at most and are never persisted.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub credential: SessionCredential,
    pub identity: AgentIdentity,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn pre_registered(
        id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        identity: AgentIdentity,
    ) -> Self {
        Self {
            id: id.into(),
            credential: SessionCredential::ClientCredentials {
                client_id: client_id.into(),
                client_secret: client_secret.into(),
            },
            identity,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn bearer(
        id: impl Into<String>,
        token: impl Into<String>,
        identity: AgentIdentity,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: id.into(),
            credential: SessionCredential::Bearer {
                token: token.into(),
            },
            identity,
            created_at: Utc::now(),
            expires_at,
        }
    }

    /// A session past its expiry must never be trusted, even if still cached.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn bearer_token(&self) -> Option<&str> {
        match &self.credential {
            SessionCredential::Bearer { token } => Some(token),
            SessionCredential::ClientCredentials { .. } => None,
        }
    }

    pub fn client_credentials(&self) -> Option<(&str, &str)> {
        match &self.credential {
            SessionCredential::ClientCredentials {
                client_id,
                client_secret,
            } => Some((client_id, client_secret)),
            SessionCredential::Bearer { .. } => None,
        }
    }

    /// Short label for logs and the session echo endpoint.
    pub fn kind(&self) -> &'static str {
        match &self.credential {
            SessionCredential::ClientCredentials { .. } => "pre_registered",
            SessionCredential::Bearer { .. } => "bearer",
        }
    }
}

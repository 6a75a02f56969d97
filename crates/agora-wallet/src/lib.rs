//! HTTP client for the wallet service.
//!
//! The wallet owns agent credentials, spending limits, and payment
//! authorization. This client covers its OAuth surface (client-credentials
//! grant, token introspection, RFC 8628 device authorization), pairing-code
//! access requests, and payment-token issuance with step-up approval.
//!
//! Access tokens are memoized per client instance and refreshed when within
//! [`TOKEN_REFRESH_MARGIN_SECS`] of expiry. Refreshes are single-flight:
//! concurrent callers await one shared in-flight token request instead of
//! each hitting the OAuth endpoint.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, Method, RequestBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use agora_types::{SpendingLimits, StepUpStatus};

/// Seconds before expiry at which a cached access token counts as stale.
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// RFC 8628 grant type for the device-code token exchange.
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// The wallet answered with a non-2xx status. The body is preserved
    /// verbatim so callers can pass it through unchanged.
    #[error("wallet returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("wallet request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid wallet client configuration: {0}")]
    Config(String),

    /// The wallet answered 2xx but the payload does not make sense.
    #[error("unexpected wallet response: {0}")]
    Protocol(String),

    /// A shared token refresh failed; every waiter sees the same cause.
    #[error(transparent)]
    Refresh(#[from] Arc<WalletError>),
}

impl WalletError {
    pub fn status(&self) -> Option<u16> {
        match self {
            WalletError::Upstream { status, .. } => Some(*status),
            WalletError::Refresh(inner) => inner.status(),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            WalletError::Upstream { body, .. } => Some(body),
            WalletError::Refresh(inner) => inner.body(),
            _ => None,
        }
    }
}

pub type WalletResult<T> = std::result::Result<T, WalletError>;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Clone)]
pub struct WalletConfig {
    /// Base URL of the wallet service, without a trailing slash.
    pub base_url: String,
    /// OAuth client id used for the client-credentials and device grants.
    pub client_id: String,
    pub client_secret: String,
    /// Request timeout applied to every call.
    pub timeout: Duration,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8082".to_string(),
            client_id: "agora-gateway".to_string(),
            client_secret: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

// Secret material must never reach log output.
impl std::fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// OAuth token grant response, shared by the client-credentials and
/// device-code grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Introspection response (RFC 7662), reduced to the claims the gateway reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl Introspection {
    /// The `exp` claim as a timestamp, when present and representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0))
    }
}

/// Spending limits proposed when requesting access to a user's wallet.
#[derive(Debug, Clone, Serialize)]
pub struct RequestedLimits {
    pub per_transaction: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<Decimal>,
    pub currency: String,
}

/// Body for starting a device authorization tied to a single payment.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceAuthorizationRequest {
    pub agent_name: String,
    pub agent_description: String,
    pub scope: String,
    pub response_type: String,
    pub spending_limits: RequestedLimits,
    /// Lets the wallet push a notification instead of waiting for code entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_email: Option<String>,
}

/// Wallet answer to a device-authorization request.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorizationGrant {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub interval: Option<u64>,
    /// Whether the wallet managed to notify the user out-of-band.
    #[serde(default)]
    pub notification_sent: Option<bool>,
}

/// One round of the RFC 8628 device-code token poll.
#[derive(Debug, Clone)]
pub enum DeviceTokenPoll {
    /// The user approved; the grant carries a fresh access token.
    Approved(TokenResponse),
    /// Steady state: the user has not decided yet.
    Pending,
    /// The wallet asked us to back off before polling again.
    SlowDown,
    /// The user declined the authorization.
    Denied,
    /// The device code expired before the user decided.
    Expired,
}

/// Pairing-code access request submitted on behalf of an agent.
#[derive(Debug, Clone, Serialize)]
pub struct AccessRequest {
    pub pairing_code: String,
    pub agent_name: String,
    pub agent_description: String,
    pub permissions: Vec<String>,
    pub spending_limits: RequestedLimits,
}

/// Wallet acknowledgement of a submitted access request.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessRequestReceipt {
    pub request_id: String,
    #[serde(default)]
    pub poll_url: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRequestState {
    Pending,
    Approved,
    Rejected,
}

/// Client credentials issued when a user approves an access request.
#[derive(Clone, Deserialize)]
pub struct IssuedCredentials {
    pub client_id: String,
    pub client_secret: String,
}

// Secret material must never reach log output.
impl std::fmt::Debug for IssuedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Current state of a pairing-code access request.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessRequestStatus {
    pub status: AccessRequestState,
    #[serde(default)]
    pub credentials: Option<IssuedCredentials>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub spending_limits: Option<SpendingLimits>,
    #[serde(default)]
    pub time_remaining_seconds: Option<u64>,
}

/// Body for requesting a single-transaction payment token.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentTokenRequest {
    pub amount: Decimal,
    pub currency: String,
    pub merchant_id: String,
    pub session_id: String,
}

/// Outcome of a payment-token request.
#[derive(Debug, Clone)]
pub enum PaymentTokenGrant {
    /// The amount was within limits; the token is ready to spend.
    Approved { payment_token: String },
    /// Human approval is required before a token is issued.
    StepUpRequired {
        step_up_id: String,
        expires_at: Option<DateTime<Utc>>,
    },
}

#[derive(Deserialize)]
struct PaymentTokenWire {
    #[serde(default)]
    payment_token: Option<String>,
    #[serde(default)]
    step_up_required: Option<bool>,
    #[serde(default)]
    step_up_id: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl PaymentTokenWire {
    fn into_grant(self) -> WalletResult<PaymentTokenGrant> {
        if self.step_up_required.unwrap_or(false) {
            let step_up_id = self.step_up_id.ok_or_else(|| {
                WalletError::Protocol("step_up_required without a step_up_id".to_string())
            })?;
            return Ok(PaymentTokenGrant::StepUpRequired {
                step_up_id,
                expires_at: self.expires_at,
            });
        }
        match self.payment_token {
            Some(payment_token) => Ok(PaymentTokenGrant::Approved { payment_token }),
            None => Err(WalletError::Protocol(
                "payment response carried neither a token nor a step-up".to_string(),
            )),
        }
    }
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
}

// ============================================================================
// Token Cache
// ============================================================================

enum TokenSource {
    /// Refreshable client-credentials grant using the configured id/secret.
    ClientCredentials,
    /// A fixed externally supplied bearer token, never refreshed. The wallet
    /// rejects it once it expires; that rejection is surfaced as-is.
    Static(String),
}

type SharedRefresh = Shared<BoxFuture<'static, Result<CachedToken, Arc<WalletError>>>>;

#[derive(Default)]
struct TokenCache {
    current: Option<CachedToken>,
    refresh: Option<SharedRefresh>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client for the wallet's agent-facing API.
///
/// Cheap to clone; clones share the connection pool and the token cache.
#[derive(Clone)]
pub struct WalletClient {
    config: Arc<WalletConfig>,
    client: Client,
    source: Arc<TokenSource>,
    tokens: Arc<Mutex<TokenCache>>,
}

impl WalletClient {
    pub fn new(config: WalletConfig) -> WalletResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WalletError::Config(e.to_string()))?;

        let config = WalletConfig {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ..config
        };

        Ok(Self {
            config: Arc::new(config),
            client,
            source: Arc::new(TokenSource::ClientCredentials),
            tokens: Arc::new(Mutex::new(TokenCache::default())),
        })
    }

    /// A sibling client that authenticates with a fixed bearer token instead
    /// of the configured client credentials. Used for bearer-token sessions
    /// and for tokens freshly obtained from a device grant.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            config: Arc::clone(&self.config),
            client: self.client.clone(),
            source: Arc::new(TokenSource::Static(token.into())),
            tokens: Arc::new(Mutex::new(TokenCache::default())),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    /// Current access token, fetching or refreshing it if needed.
    ///
    /// At most one token request is in flight per client; concurrent callers
    /// share its outcome.
    pub async fn get_access_token(&self) -> WalletResult<String> {
        if let TokenSource::Static(token) = self.source.as_ref() {
            return Ok(token.clone());
        }

        let refresh = {
            let mut cache = self.tokens.lock().await;
            if let Some(current) = &cache.current {
                if current.is_fresh(Utc::now()) {
                    return Ok(current.access_token.clone());
                }
            }
            match &cache.refresh {
                Some(refresh) => refresh.clone(),
                None => {
                    let refresh = self.start_refresh();
                    cache.refresh = Some(refresh.clone());
                    refresh
                }
            }
        };

        match refresh.await {
            Ok(token) => Ok(token.access_token),
            Err(err) => Err(WalletError::Refresh(err)),
        }
    }

    fn start_refresh(&self) -> SharedRefresh {
        let client = self.clone();
        async move {
            let result = client.fetch_token().await.map_err(Arc::new);
            // The winning execution alone clears the in-flight slot, so a
            // refresh started later can never be wiped by a stale waiter.
            let mut cache = client.tokens.lock().await;
            cache.refresh = None;
            if let Ok(token) = &result {
                cache.current = Some(token.clone());
            }
            result
        }
        .boxed()
        .shared()
    }

    async fn fetch_token(&self) -> WalletResult<CachedToken> {
        let resp: TokenResponse = self
            .send(self.request(Method::POST, "/oauth/token").form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ]))
            .await?;
        tracing::debug!(
            client_id = %self.config.client_id,
            expires_in = resp.expires_in,
            "obtained wallet access token"
        );
        Ok(CachedToken {
            access_token: resp.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(resp.expires_in as i64),
        })
    }

    /// Validate a bearer token. Only `active: true` answers are trustworthy.
    pub async fn introspect(&self, token: &str) -> WalletResult<Introspection> {
        self.send(
            self.request(Method::POST, "/oauth/introspect")
                .form(&[("token", token)]),
        )
        .await
    }

    /// Fresh snapshot of the credential's spending limits.
    pub async fn get_spending_limits(&self) -> WalletResult<SpendingLimits> {
        let token = self.get_access_token().await?;
        self.send(self.request(Method::GET, "/limits").bearer_auth(token))
            .await
    }

    /// Request a single-use payment token for one transaction.
    pub async fn request_payment_token(
        &self,
        request: &PaymentTokenRequest,
    ) -> WalletResult<PaymentTokenGrant> {
        let token = self.get_access_token().await?;
        let wire: PaymentTokenWire = self
            .send(
                self.request(Method::POST, "/payments/token")
                    .bearer_auth(token)
                    .json(request),
            )
            .await?;
        wire.into_grant()
    }

    pub async fn get_step_up_status(&self, step_up_id: &str) -> WalletResult<StepUpStatus> {
        let token = self.get_access_token().await?;
        self.send(
            self.request(Method::GET, &format!("/payments/token/{step_up_id}/status"))
                .bearer_auth(token),
        )
        .await
    }

    /// Poll a step-up request until it leaves `pending` or `timeout` elapses.
    ///
    /// Running out of time is an expected outcome and is reported as a
    /// synthetic `expired` status, not as an error.
    pub async fn wait_for_step_up_approval(
        &self,
        step_up_id: &str,
        timeout: Duration,
        interval: Duration,
    ) -> WalletResult<StepUpStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.get_step_up_status(step_up_id).await?;
            if status.status.is_terminal() {
                return Ok(status);
            }
            if tokio::time::Instant::now() + interval > deadline {
                tracing::debug!(step_up_id, "step-up wait timed out");
                return Ok(StepUpStatus::expired());
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Start a device authorization for a guest payment.
    pub async fn begin_device_authorization(
        &self,
        request: &DeviceAuthorizationRequest,
    ) -> WalletResult<DeviceAuthorizationGrant> {
        self.send(
            self.request(Method::POST, "/oauth/device_authorization")
                .json(request),
        )
        .await
    }

    /// One round of the device-code token poll.
    ///
    /// The four RFC 8628 error codes are statuses, not failures; anything
    /// else non-2xx is surfaced as [`WalletError::Upstream`].
    pub async fn poll_device_token(&self, device_code: &str) -> WalletResult<DeviceTokenPoll> {
        let resp = self
            .request(Method::POST, "/oauth/token")
            .form(&[
                ("grant_type", DEVICE_CODE_GRANT),
                ("device_code", device_code),
                ("client_id", self.config.client_id.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(DeviceTokenPoll::Approved(resp.json().await?));
        }

        let body = resp.text().await.unwrap_or_default();
        let code = serde_json::from_str::<OAuthErrorBody>(&body).ok();
        match code.as_ref().map(|c| c.error.as_str()) {
            Some("authorization_pending") => Ok(DeviceTokenPoll::Pending),
            Some("slow_down") => Ok(DeviceTokenPoll::SlowDown),
            Some("access_denied") => Ok(DeviceTokenPoll::Denied),
            Some("expired_token") => Ok(DeviceTokenPoll::Expired),
            _ => Err(WalletError::Upstream {
                status: status.as_u16(),
                body,
            }),
        }
    }

    /// Submit a pairing-code access request on behalf of an agent.
    pub async fn create_access_request(
        &self,
        request: &AccessRequest,
    ) -> WalletResult<AccessRequestReceipt> {
        self.send(self.request(Method::POST, "/access-request").json(request))
            .await
    }

    pub async fn get_access_request(
        &self,
        request_id: &str,
    ) -> WalletResult<AccessRequestStatus> {
        self.send(self.request(Method::GET, &format!("/access-request/{request_id}")))
            .await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        self.client.request(method, url)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> WalletResult<T> {
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(WalletError::Upstream {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(resp.json().await?)
    }
}

// ============================================================================
// Tests
// ============================================================================

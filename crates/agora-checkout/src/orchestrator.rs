//! The checkout state machine.
//!
//! Sequences cart creation, buyer/fulfillment updates, payment-token or
//! device-authorization acquisition, step-up escalation, and completion,
//! across three authentication postures: pre-registered client, OAuth
//! bearer, and guest. The store owns the checkout record and the wallet
//! owns approval state; everything held here is a cache or a pending
//! marker, never a source of truth.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use agora_store::{StoreClient, StoreError};
use agora_types::{
    Cart, CartItem, CheckoutSession, CheckoutStatus, CheckoutUpdate, Order, StepUpState,
};
use agora_wallet::{
    DeviceAuthorizationRequest, PaymentTokenGrant, PaymentTokenRequest, RequestedLimits,
    WalletClient, WalletError,
};

use crate::error::{CheckoutError, CheckoutResult};
use crate::limits::{self, LimitDecision};
use crate::pending::{
    InMemoryPendingStore, PendingDeviceAuthorization, PendingStepUp, PendingStore,
};
use crate::poller::{DeviceAuthPoller, PollStep};
use crate::{deeplink, qr};

/// How the caller is authenticated for checkout operations.
///
/// Store calls carry the session's wallet access token as bearer; for a
/// static bearer session that is the presented token itself, and guests
/// send no Authorization header at all.
pub enum CallerAuth {
    /// Session backed by issued client credentials.
    PreRegistered { wallet: WalletClient },
    /// Session backed by a presented OAuth bearer token.
    Bearer { wallet: WalletClient },
    /// No credentials; authentication is deferred to the payment step.
    Guest,
}

impl CallerAuth {
    pub fn is_guest(&self) -> bool {
        matches!(self, CallerAuth::Guest)
    }

    fn wallet(&self) -> Option<&WalletClient> {
        match self {
            CallerAuth::PreRegistered { wallet } | CallerAuth::Bearer { wallet } => Some(wallet),
            CallerAuth::Guest => None,
        }
    }

    async fn store_bearer(&self) -> Result<Option<String>, WalletError> {
        match self.wallet() {
            Some(wallet) => Ok(Some(wallet.get_access_token().await?)),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for CallerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallerAuth::PreRegistered { .. } => "PreRegistered",
            CallerAuth::Bearer { .. } => "Bearer",
            CallerAuth::Guest => "Guest",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct OrchestratorConfig {
    /// Merchant account the wallet debits against.
    pub merchant_id: String,
    /// Shared secret for signing wallet deep links; absent leaves URLs
    /// unsigned and the web flow asks for code and email manually.
    pub deep_link_secret: Option<String>,
    /// Agent name sent with guest device authorizations when the checkout
    /// names no merchant.
    pub gateway_name: String,
    /// Device-authorization lifetime when the wallet reports none.
    pub device_auth_expiry_secs: u64,
    /// Step-up record lifetime when the wallet reports no expiry.
    pub step_up_expiry_secs: u64,
    /// Poll interval when the wallet reports none.
    pub default_poll_interval_secs: u64,
    /// Ceiling for slow_down backoff.
    pub max_poll_interval_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            merchant_id: "store_banksim_ca".to_string(),
            deep_link_secret: None,
            gateway_name: "Agora Gateway".to_string(),
            device_auth_expiry_secs: 300,
            step_up_expiry_secs: 900,
            default_poll_interval_secs: 5,
            max_poll_interval_secs: 30,
        }
    }
}

// Secret material must never reach log output.
impl fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("merchant_id", &self.merchant_id)
            .field(
                "deep_link_secret",
                &self.deep_link_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("gateway_name", &self.gateway_name)
            .field("device_auth_expiry_secs", &self.device_auth_expiry_secs)
            .field("step_up_expiry_secs", &self.step_up_expiry_secs)
            .field(
                "default_poll_interval_secs",
                &self.default_poll_interval_secs,
            )
            .field("max_poll_interval_secs", &self.max_poll_interval_secs)
            .finish()
    }
}

/// A completed purchase, with the totals the checkout was settled at.
#[derive(Debug, Clone)]
pub struct CompletedOrder {
    pub order: Order,
    pub total: Decimal,
    pub currency: String,
}

/// Challenge returned when the wallet demands human approval in-app.
#[derive(Debug, Clone)]
pub struct StepUpChallenge {
    pub step_up_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
}

/// Challenge returned when a guest must authorize via device flow.
#[derive(Debug, Clone)]
pub struct DeviceAuthChallenge {
    pub request_id: String,
    pub user_code: String,
    pub verification_uri: String,
    pub authorization_url: String,
    pub expires_in: u64,
    pub interval: u64,
    pub notification_sent: bool,
    pub amount: Decimal,
    pub currency: String,
    /// Whether a QR image was rendered; render failures degrade to manual
    /// code entry instead of failing the completion.
    pub qr_available: bool,
}

/// Three-way result of a completion attempt.
#[derive(Debug)]
pub enum CompletionOutcome {
    Completed(CompletedOrder),
    StepUpRequired(StepUpChallenge),
    AuthorizationRequired(DeviceAuthChallenge),
}

/// Result of polling a pending step-up.
#[derive(Debug)]
pub enum StepUpPollOutcome {
    Pending,
    Completed(CompletedOrder),
    Rejected,
    Expired,
}

/// Result of polling a pending device authorization.
#[derive(Debug)]
pub enum DeviceAuthPollOutcome {
    Pending {
        expires_in: u64,
        interval: u64,
        user_code: String,
        verification_uri: String,
    },
    Completed(CompletedOrder),
    Rejected,
    Expired,
}

pub struct CheckoutOrchestrator {
    config: OrchestratorConfig,
    store: StoreClient,
    wallet: WalletClient,
    poller: DeviceAuthPoller,
    device_auths: Arc<dyn PendingStore<PendingDeviceAuthorization>>,
    step_ups: Arc<dyn PendingStore<PendingStepUp>>,
    /// Cart snapshots for guest checkouts; advisory, dropped on completion.
    guest_shadows: DashMap<String, Cart>,
    /// Per-checkout locks serializing complete/poll-resolution transitions.
    session_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CheckoutOrchestrator {
    /// Orchestrator with in-process pending stores.
    pub fn new(config: OrchestratorConfig, store: StoreClient, wallet: WalletClient) -> Self {
        Self::with_stores(
            config,
            store,
            wallet,
            Arc::new(InMemoryPendingStore::new()),
            Arc::new(InMemoryPendingStore::new()),
        )
    }

    pub fn with_stores(
        config: OrchestratorConfig,
        store: StoreClient,
        wallet: WalletClient,
        device_auths: Arc<dyn PendingStore<PendingDeviceAuthorization>>,
        step_ups: Arc<dyn PendingStore<PendingStepUp>>,
    ) -> Self {
        let poller = DeviceAuthPoller::new(
            wallet.clone(),
            store.clone(),
            config.merchant_id.clone(),
            config.max_poll_interval_secs,
        );
        Self {
            config,
            store,
            wallet,
            poller,
            device_auths,
            step_ups,
            guest_shadows: DashMap::new(),
            session_locks: DashMap::new(),
        }
    }

    /// Open a checkout; guests are allowed and get a cart shadow recorded.
    pub async fn create_checkout(
        &self,
        items: &[CartItem],
        auth: &CallerAuth,
    ) -> CheckoutResult<CheckoutSession> {
        let bearer = self.store_bearer(auth).await?;
        let checkout = self.store.create_checkout(items, bearer.as_deref()).await?;
        if auth.is_guest() {
            self.guest_shadows
                .insert(checkout.session_id.clone(), checkout.cart.clone());
        }
        Ok(checkout)
    }

    pub async fn get_checkout(
        &self,
        session_id: &str,
        auth: &CallerAuth,
    ) -> CheckoutResult<CheckoutSession> {
        let bearer = self.store_bearer(auth).await?;
        Ok(self.store.get_checkout(session_id, bearer.as_deref()).await?)
    }

    /// Forward a partial update; the store recomputes totals and status.
    pub async fn update_checkout(
        &self,
        session_id: &str,
        update: &CheckoutUpdate,
        auth: &CallerAuth,
    ) -> CheckoutResult<CheckoutSession> {
        let bearer = self.store_bearer(auth).await?;
        let checkout = self
            .store
            .update_checkout(session_id, update, bearer.as_deref())
            .await?;
        if self.guest_shadows.contains_key(session_id) {
            self.guest_shadows
                .insert(session_id.to_string(), checkout.cart.clone());
        }
        Ok(checkout)
    }

    pub async fn cancel_checkout(&self, session_id: &str, auth: &CallerAuth) -> CheckoutResult<()> {
        let bearer = self.store_bearer(auth).await?;
        self.store
            .cancel_checkout(session_id, bearer.as_deref())
            .await?;
        self.guest_shadows.remove(session_id);
        self.device_auths.remove_for_checkout(session_id).await;
        self.step_ups.remove_for_checkout(session_id).await;
        self.session_locks.remove(session_id);
        tracing::info!(session_id, "checkout cancelled");
        Ok(())
    }

    pub async fn get_order(&self, order_id: &str, auth: &CallerAuth) -> CheckoutResult<Order> {
        let bearer = self.store_bearer(auth).await?;
        Ok(self.store.get_order(order_id, bearer.as_deref()).await?)
    }

    /// The cached cart for a guest checkout, if one is being tracked.
    pub fn guest_cart(&self, session_id: &str) -> Option<Cart> {
        self.guest_shadows
            .get(session_id)
            .map(|entry| entry.clone())
    }

    /// Attempt completion. Only a checkout in `ready_for_payment` may
    /// proceed; the outcome depends on the caller's authentication posture.
    pub async fn complete(
        &self,
        session_id: &str,
        auth: &CallerAuth,
    ) -> CheckoutResult<CompletionOutcome> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let bearer = self.store_bearer(auth).await?;
        let checkout = self
            .store
            .get_checkout(session_id, bearer.as_deref())
            .await
            .map_err(checkout_lookup_err)?;
        require_ready(&checkout)?;

        match auth.wallet() {
            Some(wallet) => {
                self.authenticated_completion(&checkout, wallet, bearer.as_deref())
                    .await
            }
            None => {
                let challenge = self.begin_device_authorization(&checkout).await?;
                Ok(CompletionOutcome::AuthorizationRequired(challenge))
            }
        }
    }

    /// Poll a pending step-up; approval consumes the payment token and
    /// completes the checkout in the same call.
    pub async fn poll_step_up(
        &self,
        session_id: &str,
        step_up_id: &str,
        auth: &CallerAuth,
    ) -> CheckoutResult<StepUpPollOutcome> {
        let Some(wallet) = auth.wallet() else {
            return Err(CheckoutError::Unauthorized);
        };

        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let Some(pending) = self.step_ups.get(step_up_id).await else {
            return Err(CheckoutError::UnknownStepUp);
        };
        if pending.checkout_session_id != session_id {
            return Err(CheckoutError::AuthorizationMismatch);
        }
        if Utc::now() >= pending.expires_at {
            self.step_ups.take(step_up_id).await;
            return Ok(StepUpPollOutcome::Expired);
        }

        let status = wallet.get_step_up_status(step_up_id).await?;
        match status.status {
            StepUpState::Pending => Ok(StepUpPollOutcome::Pending),
            StepUpState::Rejected => {
                self.step_ups.take(step_up_id).await;
                tracing::info!(session_id, step_up_id, "user rejected the step-up");
                Ok(StepUpPollOutcome::Rejected)
            }
            StepUpState::Expired => {
                self.step_ups.take(step_up_id).await;
                Ok(StepUpPollOutcome::Expired)
            }
            StepUpState::Approved => {
                let Some(payment_token) = status.payment_token else {
                    return Err(WalletError::Protocol(
                        "approved step-up carried no payment token".to_string(),
                    )
                    .into());
                };
                let bearer = self.store_bearer(auth).await?;
                let order = self
                    .store
                    .complete_checkout(session_id, &payment_token, None, bearer.as_deref())
                    .await?;
                self.step_ups.take(step_up_id).await;
                self.finish_session(session_id);
                tracing::info!(
                    session_id,
                    step_up_id,
                    order_id = %order.id,
                    "step-up approved and checkout completed"
                );
                Ok(StepUpPollOutcome::Completed(CompletedOrder {
                    order,
                    total: pending.amount,
                    currency: pending.currency,
                }))
            }
        }
    }

    /// Poll a pending device authorization; approval chains the payment
    /// token and the store completion into this same call.
    pub async fn poll_device_auth(
        &self,
        session_id: &str,
        request_id: &str,
    ) -> CheckoutResult<DeviceAuthPollOutcome> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let Some(pending) = self.device_auths.get(request_id).await else {
            return Err(CheckoutError::UnknownAuthorization);
        };
        if pending.checkout_session_id != session_id {
            return Err(CheckoutError::AuthorizationMismatch);
        }
        let now = Utc::now();
        if now >= pending.expires_at {
            self.device_auths.take(request_id).await;
            return Ok(DeviceAuthPollOutcome::Expired);
        }

        match self.poller.poll(&pending).await? {
            PollStep::Pending => Ok(pending_outcome(&pending, now)),
            PollStep::SlowDown { interval } => {
                let mut updated = pending;
                updated.poll_interval = interval;
                self.device_auths
                    .insert(request_id.to_string(), updated.clone())
                    .await;
                Ok(pending_outcome(&updated, now))
            }
            PollStep::Denied => {
                self.device_auths.take(request_id).await;
                Ok(DeviceAuthPollOutcome::Rejected)
            }
            PollStep::Expired => {
                self.device_auths.take(request_id).await;
                Ok(DeviceAuthPollOutcome::Expired)
            }
            PollStep::Completed { order } => {
                self.device_auths.take(request_id).await;
                self.finish_session(session_id);
                Ok(DeviceAuthPollOutcome::Completed(CompletedOrder {
                    order,
                    total: pending.amount,
                    currency: pending.currency.clone(),
                }))
            }
        }
    }

    /// The QR image for a pending authorization.
    ///
    /// Unknown ids and render-failed records answer NotFound; an expired
    /// record is deleted and answers Expired.
    pub async fn qr_image(&self, request_id: &str) -> CheckoutResult<Vec<u8>> {
        let Some(pending) = self.device_auths.get(request_id).await else {
            return Err(CheckoutError::UnknownAuthorization);
        };
        let Some(png) = pending.qr_png else {
            return Err(CheckoutError::UnknownAuthorization);
        };
        if Utc::now() >= pending.expires_at {
            self.device_auths.take(request_id).await;
            return Err(CheckoutError::Expired);
        }
        Ok(png)
    }

    /// Drop expired pending records from both stores.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let removed = self.device_auths.sweep_expired(now).await
            + self.step_ups.sweep_expired(now).await;
        if removed > 0 {
            tracing::debug!(removed, "swept expired pending authorizations");
        }
        removed
    }

    async fn authenticated_completion(
        &self,
        checkout: &CheckoutSession,
        wallet: &WalletClient,
        store_bearer: Option<&str>,
    ) -> CheckoutResult<CompletionOutcome> {
        let amount = checkout.cart.total;
        let currency = checkout.cart.currency.clone();

        // Fresh snapshot; the advisory verdict only shapes logging, the
        // wallet's own answer below decides.
        let spending = wallet.get_spending_limits().await?;
        match limits::evaluate(amount, &currency, &spending) {
            LimitDecision::AutoApprove => {}
            LimitDecision::StepUpExpected { exceeded } => {
                tracing::debug!(limit = %exceeded, %amount, "amount expected to trigger step-up");
            }
            LimitDecision::CurrencyMismatch { limit_currency } => {
                tracing::warn!(
                    checkout_currency = %currency,
                    %limit_currency,
                    "checkout currency differs from wallet limits"
                );
            }
        }

        let grant = wallet
            .request_payment_token(&PaymentTokenRequest {
                amount,
                currency: currency.clone(),
                merchant_id: self.config.merchant_id.clone(),
                session_id: checkout.session_id.clone(),
            })
            .await?;

        match grant {
            PaymentTokenGrant::Approved { payment_token } => {
                let order = self
                    .store
                    .complete_checkout(&checkout.session_id, &payment_token, None, store_bearer)
                    .await?;
                self.finish_session(&checkout.session_id);
                tracing::info!(
                    session_id = %checkout.session_id,
                    order_id = %order.id,
                    "checkout completed"
                );
                Ok(CompletionOutcome::Completed(CompletedOrder {
                    order,
                    total: amount,
                    currency,
                }))
            }
            PaymentTokenGrant::StepUpRequired {
                step_up_id,
                expires_at,
            } => {
                let expires_at = expires_at.unwrap_or_else(|| {
                    Utc::now() + Duration::seconds(self.config.step_up_expiry_secs as i64)
                });
                self.step_ups
                    .insert(
                        step_up_id.clone(),
                        PendingStepUp {
                            step_up_id: step_up_id.clone(),
                            checkout_session_id: checkout.session_id.clone(),
                            amount,
                            currency: currency.clone(),
                            created_at: Utc::now(),
                            expires_at,
                        },
                    )
                    .await;
                tracing::info!(
                    session_id = %checkout.session_id,
                    step_up_id = %step_up_id,
                    %amount,
                    "step-up required for completion"
                );
                Ok(CompletionOutcome::StepUpRequired(StepUpChallenge {
                    step_up_id,
                    amount,
                    currency,
                    expires_at,
                }))
            }
        }
    }

    /// Guest path: a device-authorization grant scoped to the checkout's
    /// exact total, so an intercepted device code cannot spend more.
    async fn begin_device_authorization(
        &self,
        checkout: &CheckoutSession,
    ) -> CheckoutResult<DeviceAuthChallenge> {
        let amount = checkout.cart.total;
        let currency = checkout.cart.currency.clone();
        let buyer_email = checkout.buyer.as_ref().and_then(|b| b.email.clone());
        let agent_name = checkout
            .merchant
            .as_ref()
            .map(|m| m.name.clone())
            .unwrap_or_else(|| self.config.gateway_name.clone());

        let grant = self
            .wallet
            .begin_device_authorization(&DeviceAuthorizationRequest {
                agent_name,
                agent_description: format!(
                    "Payment authorization for checkout {}",
                    checkout.session_id
                ),
                scope: "browse cart purchase".to_string(),
                response_type: "token".to_string(),
                spending_limits: RequestedLimits {
                    per_transaction: amount,
                    daily: None,
                    monthly: None,
                    currency: currency.clone(),
                },
                buyer_email: buyer_email.clone(),
            })
            .await?;

        let notification_sent = grant.notification_sent.unwrap_or(false);
        let expires_in = grant
            .expires_in
            .unwrap_or(self.config.device_auth_expiry_secs);
        let interval = grant
            .interval
            .unwrap_or(self.config.default_poll_interval_secs);
        let expires_at = Utc::now() + Duration::seconds(expires_in as i64);

        let base_url = grant
            .verification_uri_complete
            .clone()
            .unwrap_or_else(|| grant.verification_uri.clone());
        let authorization_url = deeplink::signed_authorization_url(
            &base_url,
            self.config.deep_link_secret.as_deref(),
            buyer_email.as_deref(),
            &grant.user_code,
        );

        let qr_png = match qr::render_png(&authorization_url) {
            Ok(png) => Some(png),
            Err(err) => {
                // Manual code entry still works without an image.
                tracing::warn!(error = %err, "failed to render authorization QR");
                None
            }
        };
        let qr_available = qr_png.is_some();

        let request_id = new_request_id();
        self.device_auths
            .insert(
                request_id.clone(),
                PendingDeviceAuthorization {
                    request_id: request_id.clone(),
                    checkout_session_id: checkout.session_id.clone(),
                    device_code: grant.device_code,
                    user_code: grant.user_code.clone(),
                    verification_uri: grant.verification_uri.clone(),
                    authorization_url: authorization_url.clone(),
                    expires_at,
                    poll_interval: interval,
                    amount,
                    currency: currency.clone(),
                    qr_png,
                },
            )
            .await;
        tracing::info!(
            session_id = %checkout.session_id,
            request_id = %request_id,
            notification_sent,
            "device authorization initiated"
        );

        Ok(DeviceAuthChallenge {
            request_id,
            user_code: grant.user_code,
            verification_uri: grant.verification_uri,
            authorization_url,
            expires_in,
            interval,
            notification_sent,
            amount,
            currency,
            qr_available,
        })
    }

    async fn store_bearer(&self, auth: &CallerAuth) -> CheckoutResult<Option<String>> {
        Ok(auth.store_bearer().await?)
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn finish_session(&self, session_id: &str) {
        self.guest_shadows.remove(session_id);
        self.session_locks.remove(session_id);
    }
}

fn require_ready(checkout: &CheckoutSession) -> CheckoutResult<()> {
    if checkout.status != CheckoutStatus::ReadyForPayment {
        return Err(CheckoutError::InvalidState {
            status: checkout.status,
            next_step: next_step_for(checkout.status),
        });
    }
    Ok(())
}

fn next_step_for(status: CheckoutStatus) -> &'static str {
    match status {
        CheckoutStatus::CartBuilding => "Update checkout with buyer and fulfillment info first",
        CheckoutStatus::ReadyForPayment => "Complete the checkout",
        CheckoutStatus::AwaitingAuthorization => {
            "An authorization is already in progress; poll its status endpoint"
        }
        CheckoutStatus::Completed => "This checkout is already completed",
        CheckoutStatus::Cancelled | CheckoutStatus::Expired => "Create a new checkout",
    }
}

fn checkout_lookup_err(err: StoreError) -> CheckoutError {
    if err.is_not_found() {
        CheckoutError::UnknownCheckout
    } else {
        CheckoutError::Store(err)
    }
}

fn pending_outcome(
    pending: &PendingDeviceAuthorization,
    now: DateTime<Utc>,
) -> DeviceAuthPollOutcome {
    let expires_in = (pending.expires_at - now).num_seconds().max(0) as u64;
    DeviceAuthPollOutcome::Pending {
        expires_in,
        interval: pending.poll_interval,
        user_code: pending.user_code.clone(),
        verification_uri: pending.verification_uri.clone(),
    }
}

fn new_request_id() -> String {
    format!("pay_{}", Uuid::new_v4().simple())
}

//! RFC 8628 device-flow resolution.
//!
//! One poll step exchanges the device code at the wallet's token endpoint.
//! On approval, the payment-token request and the store completion are
//! chained in the same step, so a single poll response carries the final
//! order and no window is left for a concurrent completion attempt.

use agora_store::StoreClient;
use agora_types::Order;
use agora_wallet::{
    DeviceTokenPoll, PaymentTokenGrant, PaymentTokenRequest, WalletClient, WalletError,
};

use crate::error::CheckoutResult;
use crate::pending::PendingDeviceAuthorization;

/// Seconds added to the poll interval on each `slow_down` report.
const SLOW_DOWN_STEP_SECS: u64 = 5;

/// What one poll of a pending device authorization produced.
#[derive(Debug)]
pub enum PollStep {
    /// The human has not decided yet; keep polling.
    Pending,
    /// The wallet asked for a longer interval; store the new value.
    SlowDown { interval: u64 },
    Denied,
    Expired,
    /// Approved; payment taken and the order placed.
    Completed { order: Order },
}

pub struct DeviceAuthPoller {
    wallet: WalletClient,
    store: StoreClient,
    merchant_id: String,
    max_interval: u64,
}

impl DeviceAuthPoller {
    pub fn new(
        wallet: WalletClient,
        store: StoreClient,
        merchant_id: impl Into<String>,
        max_interval: u64,
    ) -> Self {
        Self {
            wallet,
            store,
            merchant_id: merchant_id.into(),
            max_interval,
        }
    }

    pub async fn poll(&self, pending: &PendingDeviceAuthorization) -> CheckoutResult<PollStep> {
        match self.wallet.poll_device_token(&pending.device_code).await? {
            DeviceTokenPoll::Pending => {
                // Expected steady state while the human decides.
                tracing::debug!(request_id = %pending.request_id, "authorization still pending");
                Ok(PollStep::Pending)
            }
            DeviceTokenPoll::SlowDown => {
                let interval = next_interval(pending.poll_interval, self.max_interval);
                tracing::debug!(request_id = %pending.request_id, interval, "wallet asked to slow down");
                Ok(PollStep::SlowDown { interval })
            }
            DeviceTokenPoll::Denied => {
                tracing::info!(request_id = %pending.request_id, "user denied the authorization");
                Ok(PollStep::Denied)
            }
            DeviceTokenPoll::Expired => {
                tracing::info!(request_id = %pending.request_id, "device code expired at the wallet");
                Ok(PollStep::Expired)
            }
            DeviceTokenPoll::Approved(token) => self.finish(pending, token.access_token).await,
        }
    }

    /// The approved access token is used exactly once: one payment token,
    /// one store completion.
    async fn finish(
        &self,
        pending: &PendingDeviceAuthorization,
        access_token: String,
    ) -> CheckoutResult<PollStep> {
        let wallet = self.wallet.with_token(access_token.clone());
        let grant = wallet
            .request_payment_token(&PaymentTokenRequest {
                amount: pending.amount,
                currency: pending.currency.clone(),
                merchant_id: self.merchant_id.clone(),
                session_id: pending.checkout_session_id.clone(),
            })
            .await?;

        let payment_token = match grant {
            PaymentTokenGrant::Approved { payment_token } => payment_token,
            PaymentTokenGrant::StepUpRequired { .. } => {
                // The grant was scoped to this exact amount at initiation.
                return Err(WalletError::Protocol(
                    "step-up demanded for a device-authorized amount".to_string(),
                )
                .into());
            }
        };

        let order = self
            .store
            .complete_checkout(
                &pending.checkout_session_id,
                &payment_token,
                None,
                Some(&access_token),
            )
            .await?;
        tracing::info!(
            request_id = %pending.request_id,
            order_id = %order.id,
            "device authorization approved and checkout completed"
        );
        Ok(PollStep::Completed { order })
    }
}

/// Monotonic backoff: one step per `slow_down` report, capped, and never
/// below the current value.
pub(crate) fn next_interval(current: u64, max: u64) -> u64 {
    (current + SLOW_DOWN_STEP_SECS).min(max).max(current)
}

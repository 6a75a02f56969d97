//! Checkout lifecycle handlers.
//!
//! Guests and authenticated agents share every route here except the step-up
//! poll, which only exists for wallet-backed sessions. Completion is the
//! three-way fork: settled order, step-up instructions, or device-auth
//! instructions.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use agora_checkout::{
    CompletionOutcome, DeviceAuthChallenge, DeviceAuthPollOutcome, StepUpPollOutcome,
};
use agora_session::{OptionalSession, RequireSession};
use agora_types::{CheckoutSession, CheckoutStatus, CheckoutUpdate};

use crate::dto::{
    AuthorizationInstructions, CheckoutCancelled, CheckoutEnvelope, CreateCheckoutRequest,
    PollStatusResponse, PurchaseCompleted, StepUpInstructions,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    OptionalSession(session): OptionalSession,
    Json(req): Json<CreateCheckoutRequest>,
) -> ApiResult<Json<CheckoutEnvelope>> {
    let Some(items) = req.items else {
        return Err(ApiError::InvalidRequest(
            "items array is required".to_string(),
        ));
    };

    let auth = state.caller_auth(session.as_ref())?;
    let checkout = state.orchestrator.create_checkout(&items, &auth).await?;

    Ok(Json(CheckoutEnvelope {
        session: checkout,
        next_step: "PATCH /checkout/:session_id with buyer and fulfillment info",
    }))
}

pub async fn get_checkout(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    OptionalSession(session): OptionalSession,
) -> ApiResult<Json<CheckoutSession>> {
    let auth = state.caller_auth(session.as_ref())?;
    let checkout = state.orchestrator.get_checkout(&session_id, &auth).await?;
    Ok(Json(checkout))
}

/// Merge a partial update. The store recomputes totals and status; the
/// `next_step` hint flips once the checkout is payable.
pub async fn update_checkout(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    OptionalSession(session): OptionalSession,
    Json(update): Json<CheckoutUpdate>,
) -> ApiResult<Json<CheckoutEnvelope>> {
    let auth = state.caller_auth(session.as_ref())?;
    let checkout = state
        .orchestrator
        .update_checkout(&session_id, &update, &auth)
        .await?;

    let next_step = if checkout.status == CheckoutStatus::ReadyForPayment {
        "POST /checkout/:session_id/complete to finalize purchase"
    } else {
        "Continue updating checkout"
    };

    Ok(Json(CheckoutEnvelope {
        session: checkout,
        next_step,
    }))
}

pub async fn cancel_checkout(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    OptionalSession(session): OptionalSession,
) -> ApiResult<Json<CheckoutCancelled>> {
    let auth = state.caller_auth(session.as_ref())?;
    state.orchestrator.cancel_checkout(&session_id, &auth).await?;
    Ok(Json(CheckoutCancelled {
        status: "cancelled",
        session_id,
        message: "Checkout cancelled.",
    }))
}

/// Attempt to settle the checkout.
///
/// 200 when the wallet auto-approved and the store confirmed the order, 202
/// when a human has to act first. The 202 body tells the agent exactly where
/// to poll.
pub async fn complete_checkout(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    OptionalSession(session): OptionalSession,
) -> ApiResult<Response> {
    let auth = state.caller_auth(session.as_ref())?;
    let outcome = state.orchestrator.complete(&session_id, &auth).await?;

    let response = match outcome {
        CompletionOutcome::Completed(done) => Json(PurchaseCompleted {
            status: "completed",
            order_id: done.order.id,
            transaction_id: done.order.transaction_id,
            total: done.total,
            currency: done.currency,
            message: "Purchase completed successfully!",
        })
        .into_response(),
        CompletionOutcome::StepUpRequired(challenge) => (
            StatusCode::ACCEPTED,
            Json(StepUpInstructions {
                status: "step_up_required",
                poll_endpoint: format!(
                    "/checkout/{session_id}/step-up/{}",
                    challenge.step_up_id
                ),
                step_up_id: challenge.step_up_id,
                message: "Purchase exceeds auto-approve limit. User must approve in wallet app.",
                amount: challenge.amount,
                currency: challenge.currency,
            }),
        )
            .into_response(),
        CompletionOutcome::AuthorizationRequired(challenge) => {
            let message = device_auth_message(&challenge);
            let qr_code_url = challenge
                .qr_available
                .then(|| state.qr_url(&challenge.request_id));
            (
                StatusCode::ACCEPTED,
                Json(AuthorizationInstructions {
                    status: "authorization_required",
                    authorization_url: challenge.authorization_url,
                    qr_code_url,
                    poll_endpoint: format!(
                        "/checkout/{session_id}/payment-status/{}",
                        challenge.request_id
                    ),
                    user_code: challenge.user_code,
                    verification_uri: challenge.verification_uri,
                    expires_in: challenge.expires_in,
                    notification_sent: challenge.notification_sent,
                    message,
                }),
            )
                .into_response()
        }
    };
    Ok(response)
}

/// Poll a pending step-up. Wallet-backed sessions only; a guest has no
/// step-ups to poll.
pub async fn step_up_status(
    State(state): State<Arc<AppState>>,
    Path((session_id, step_up_id)): Path<(String, String)>,
    RequireSession(session): RequireSession,
) -> ApiResult<Json<PollStatusResponse>> {
    let auth = state.caller_auth(Some(&session))?;
    let outcome = state
        .orchestrator
        .poll_step_up(&session_id, &step_up_id, &auth)
        .await?;

    let response = match outcome {
        StepUpPollOutcome::Pending => {
            PollStatusResponse::new("pending", "Waiting for user approval...")
        }
        StepUpPollOutcome::Completed(done) => {
            PollStatusResponse::completed(done, "Step-up approved and purchase completed!")
        }
        StepUpPollOutcome::Rejected => {
            PollStatusResponse::new("rejected", "User rejected the purchase.")
        }
        StepUpPollOutcome::Expired => PollStatusResponse::new("expired", "Step-up request expired."),
    };
    Ok(Json(response))
}

/// Poll a pending device authorization. Guest-reachable: the whole point is
/// that the caller holds no credentials yet.
pub async fn payment_status(
    State(state): State<Arc<AppState>>,
    Path((session_id, request_id)): Path<(String, String)>,
) -> ApiResult<Json<PollStatusResponse>> {
    let outcome = state
        .orchestrator
        .poll_device_auth(&session_id, &request_id)
        .await?;

    let response = match outcome {
        DeviceAuthPollOutcome::Pending {
            expires_in,
            user_code,
            verification_uri,
            ..
        } => {
            let mut pending = PollStatusResponse::new(
                "pending",
                format!("Waiting for user to authorize payment. Enter code {user_code} at {verification_uri}"),
            );
            pending.expires_in = Some(expires_in);
            pending
        }
        DeviceAuthPollOutcome::Completed(done) => PollStatusResponse::completed(
            done,
            "Payment authorized and purchase completed successfully!",
        ),
        DeviceAuthPollOutcome::Rejected => {
            PollStatusResponse::new("rejected", "User rejected the payment authorization.")
        }
        DeviceAuthPollOutcome::Expired => PollStatusResponse::new(
            "expired",
            "Payment authorization request has expired. Please try again.",
        ),
    };
    Ok(Json(response))
}

/// Serve the QR image for a pending device authorization.
///
/// Unknown ids are 404, expired ones 410. The image encodes a one-time
/// approval link, so caches are told to keep their hands off.
pub async fn qr_image(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> ApiResult<Response> {
    let png = state.orchestrator.qr_image(&request_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        png,
    )
        .into_response())
}

fn device_auth_message(challenge: &DeviceAuthChallenge) -> String {
    let amount = format!("{} {:.2}", challenge.currency, challenge.amount);
    if challenge.notification_sent {
        format!(
            "We've sent a payment request to your phone. Check your wallet app to approve the {amount} payment. If you don't see it, enter code {} at {}.",
            challenge.user_code, challenge.verification_uri
        )
    } else {
        format!(
            "To complete your purchase of {amount}, please enter code {} at {} or scan the QR code with your wallet app.",
            challenge.user_code, challenge.verification_uri
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn challenge(notification_sent: bool) -> DeviceAuthChallenge {
        DeviceAuthChallenge {
            request_id: "pay_1".to_string(),
            user_code: "WSIM-4F7B2A".to_string(),
            verification_uri: "https://wallet.example/device".to_string(),
            authorization_url: "https://wallet.example/approve?x=1".to_string(),
            expires_in: 300,
            interval: 5,
            notification_sent,
            amount: dec!(56.5),
            currency: "CAD".to_string(),
            qr_available: true,
        }
    }

    #[test]
    fn push_message_names_the_wallet_app() {
        let message = device_auth_message(&challenge(true));
        assert!(message.starts_with("We've sent a payment request to your phone."));
        assert!(message.contains("CAD 56.50"));
        assert!(message.contains("WSIM-4F7B2A"));
    }

    #[test]
    fn fallback_message_offers_code_and_qr() {
        let message = device_auth_message(&challenge(false));
        assert!(message.starts_with("To complete your purchase of CAD 56.50"));
        assert!(message.contains("scan the QR code"));
        assert!(message.contains("https://wallet.example/device"));
    }
}

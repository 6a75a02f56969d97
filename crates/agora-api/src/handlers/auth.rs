//! Pairing-code registration and session handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use agora_session::{RegistrationStatus, RequireSession};

use crate::dto::{
    RegisterRequest, RegistrationStatusResponse, RegistrationSubmitted, SessionEcho,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Submit a pairing-code registration to the wallet.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<RegistrationSubmitted>> {
    // Empty strings count as missing.
    let (pairing_code, agent_name) = match (
        req.pairing_code.as_deref().filter(|v| !v.is_empty()),
        req.agent_name.as_deref().filter(|v| !v.is_empty()),
    ) {
        (Some(code), Some(name)) => (code, name),
        _ => {
            return Err(ApiError::InvalidRequest(
                "pairing_code and agent_name are required".to_string(),
            ))
        }
    };

    let receipt = state
        .registry
        .register(pairing_code, agent_name, req.agent_description.as_deref())
        .await?;

    Ok(Json(RegistrationSubmitted {
        status: "pending",
        poll_endpoint: format!("/auth/status/{}", receipt.request_id),
        request_id: receipt.request_id,
        message: "Registration submitted. User must approve in their wallet app.",
        expires_at: receipt.expires_at,
    }))
}

/// Poll a pending registration. Approval mints the session the agent will
/// present from then on.
pub async fn registration_status(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<RegistrationStatusResponse>> {
    let response = match state.registry.registration_status(&request_id).await? {
        RegistrationStatus::Approved {
            session_id,
            agent_id,
            permissions,
            spending_limits,
        } => RegistrationStatusResponse {
            status: "approved",
            session_id: Some(session_id),
            agent_id: Some(agent_id),
            permissions: Some(permissions),
            spending_limits,
            time_remaining_seconds: None,
            message:
                "Registration approved! Include session_id as X-Session-Id header in all requests.",
        },
        RegistrationStatus::Rejected => RegistrationStatusResponse {
            status: "rejected",
            session_id: None,
            agent_id: None,
            permissions: None,
            spending_limits: None,
            time_remaining_seconds: None,
            message: "User rejected the registration request.",
        },
        RegistrationStatus::Pending {
            time_remaining_seconds,
        } => RegistrationStatusResponse {
            status: "pending",
            session_id: None,
            agent_id: None,
            permissions: None,
            spending_limits: None,
            time_remaining_seconds,
            message: "Waiting for user approval...",
        },
    };
    Ok(Json(response))
}

/// Echo the caller's resolved session.
pub async fn current_session(RequireSession(session): RequireSession) -> Json<SessionEcho> {
    Json(SessionEcho {
        session_id: session.id,
        agent_id: session.identity.agent_id,
        created_at: session.created_at,
    })
}

//! API error handling.
//!
//! Every error leaves the gateway as `{error, error_description}` JSON with
//! a machine-readable `error` kind, plus an optional `next_step` hint on
//! state errors. Upstream rejections are passed through with their original
//! status and body, since the gateway has no authority to reinterpret a
//! store or wallet decision.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use agora_checkout::CheckoutError;
use agora_session::SessionError;
use agora_store::StoreError;
use agora_types::CheckoutStatus;
use agora_wallet::WalletError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Checkout is not ready for payment. Current status: {status}")]
    InvalidState {
        status: CheckoutStatus,
        next_step: &'static str,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Gone(&'static str),

    /// Non-2xx from the store or wallet, forwarded verbatim.
    #[error("upstream service returned {status}")]
    Upstream { status: u16, body: String },

    /// The upstream could not be reached or spoke nonsense.
    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Machine-readable error kind for the response body.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidState { .. } => "invalid_state",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Gone(_) => "expired",
            Self::Upstream { .. } | Self::BadGateway(_) => "upstream_error",
            Self::Internal(_) => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidState { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Gone(_) => StatusCode::GONE,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire shape of every gateway-originated error.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub error_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Upstream bodies are forwarded as-is when they are valid JSON;
        // anything else is wrapped so callers always get a JSON answer.
        if let Self::Upstream { body, .. } = &self {
            if let Ok(value) = serde_json::from_str::<Value>(body) {
                return (status, Json(value)).into_response();
            }
        }

        let next_step = match &self {
            Self::InvalidState { next_step, .. } => Some(*next_step),
            _ => None,
        };
        let body = ErrorBody {
            error: self.error_code(),
            error_description: self.to_string(),
            next_step,
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Upstream { status, body } => Self::Upstream { status, body },
            other => Self::BadGateway(other.to_string()),
        }
    }
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        // status()/body() see through shared-refresh wrapping.
        match (err.status(), err.body()) {
            (Some(status), Some(body)) => Self::Upstream {
                status,
                body: body.to_string(),
            },
            _ => Self::BadGateway(err.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UnknownRegistration => Self::NotFound("Registration request not found"),
            SessionError::UnknownSession | SessionError::InactiveToken => {
                Self::Unauthorized(err.to_string())
            }
            SessionError::Wallet(err) => err.into(),
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::InvalidState { status, next_step } => {
                Self::InvalidState { status, next_step }
            }
            CheckoutError::UnknownCheckout => Self::NotFound("Checkout session not found"),
            CheckoutError::UnknownAuthorization => {
                Self::NotFound("Payment authorization request not found")
            }
            CheckoutError::UnknownStepUp => Self::NotFound("Step-up request not found"),
            CheckoutError::AuthorizationMismatch => {
                Self::NotFound("Session ID does not match payment request")
            }
            CheckoutError::Expired => Self::Gone("QR code has expired"),
            CheckoutError::Unauthorized => {
                Self::Unauthorized("Authentication required for this endpoint".to_string())
            }
            CheckoutError::Store(err) => err.into(),
            CheckoutError::Wallet(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_and_statuses_line_up() {
        assert_eq!(
            ApiError::InvalidRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("missing").error_code(),
            "not_found"
        );
        assert_eq!(ApiError::Gone("old").status_code(), StatusCode::GONE);
        assert_eq!(
            ApiError::Upstream {
                status: 404,
                body: "{}".into()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn invalid_state_names_the_current_status() {
        let err = ApiError::from(CheckoutError::InvalidState {
            status: CheckoutStatus::CartBuilding,
            next_step: "Update checkout with buyer and fulfillment info first",
        });
        assert_eq!(
            err.to_string(),
            "Checkout is not ready for payment. Current status: cart_building"
        );
    }

    #[test]
    fn wallet_refresh_failures_keep_the_upstream_status() {
        let inner = WalletError::Upstream {
            status: 403,
            body: "{\"error\":\"denied\"}".into(),
        };
        let err = ApiError::from(WalletError::Refresh(std::sync::Arc::new(inner)));
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }
}

//! Session middleware for axum.
//!
//! Resolves the two accepted credential forms ahead of the handlers:
//! - `X-Session-Id` from the pairing-code registration flow
//! - `Authorization: Bearer` tokens minted by the wallet's device grant
//!
//! Requests with neither pass through as guests. Requests that present a
//! credential which fails to resolve are answered here and never reach a
//! handler.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::Response,
};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use agora_types::AuthSession;

use crate::registry::{SessionError, SessionRegistry};

/// Header carrying the opaque session id issued at registration.
pub const SESSION_HEADER: &str = "x-session-id";

/// Session resolution middleware layer
#[derive(Clone)]
pub struct SessionLayer {
    registry: Arc<SessionRegistry>,
}

impl SessionLayer {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionMiddleware {
            inner,
            registry: self.registry.clone(),
        }
    }
}

/// Session resolution middleware service
#[derive(Clone)]
pub struct SessionMiddleware<S> {
    inner: S,
    registry: Arc<SessionRegistry>,
}

impl<S> Service<Request> for SessionMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let registry = self.registry.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let session_id = header_value(req.headers(), SESSION_HEADER);
            let bearer = bearer_token(req.headers());

            if session_id.is_none() && bearer.is_none() {
                // Guest request. Handlers decide whether that is enough.
                return inner.call(req).await;
            }

            match registry
                .resolve(session_id.as_deref(), bearer.as_deref())
                .await
            {
                Ok(session) => {
                    let (mut parts, body) = req.into_parts();
                    parts.extensions.insert(session);
                    let req = Request::from_parts(parts, body);
                    inner.call(req).await
                }
                Err(err) => Ok(resolution_error_response(&err)),
            }
        })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Extract the token from an `Authorization: Bearer ...` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, rest) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Map a resolution failure onto the wire error shape.
fn resolution_error_response(err: &SessionError) -> Response {
    let (status, code) = match err {
        SessionError::Wallet(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        _ => (StatusCode::UNAUTHORIZED, "unauthorized"),
    };
    let body = serde_json::json!({
        "error": code,
        "error_description": err.to_string(),
    });

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn unauthenticated_response() -> Response {
    let body = serde_json::json!({
        "error": "unauthorized",
        "error_description":
            "Authentication required. Send an X-Session-Id header or an Authorization bearer token.",
    });

    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

// =============================================================================
// Axum Extractors
// =============================================================================

/// Extractor for the resolved session (optional)
/// Returns None when the request came in as a guest
pub struct OptionalSession(pub Option<AuthSession>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalSession
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalSession(parts.extensions.get::<AuthSession>().cloned()))
    }
}

/// Extractor for a required session
/// Returns 401 when the request carried no credentials
pub struct RequireSession(pub AuthSession);

#[async_trait]
impl<S> FromRequestParts<S> for RequireSession
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthSession>()
            .cloned()
            .map(RequireSession)
            .ok_or_else(unauthenticated_response)
    }
}

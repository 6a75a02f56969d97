//! Gateway Integration Tests
//!
//! Drives the full router against in-process store and wallet mocks,
//! covering session resolution, the guest device-authorization flow, step-up
//! escalation, and upstream error passthrough.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Form, Path, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use agora_api::{create_test_router, AppState};
use agora_checkout::{CheckoutOrchestrator, OrchestratorConfig};
use agora_session::{RegistryConfig, SessionRegistry, SESSION_HEADER};
use agora_store::{StoreClient, StoreConfig};
use agora_wallet::{WalletClient, WalletConfig};

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

// =============================================================================
// Mock upstreams
// =============================================================================

#[derive(Clone, Default)]
struct Upstreams {
    // Wallet side.
    device_grants: Arc<Mutex<VecDeque<Value>>>,
    device_polls: Arc<Mutex<VecDeque<(u16, Value)>>>,
    payment_responses: Arc<Mutex<VecDeque<Value>>>,
    step_up_statuses: Arc<Mutex<VecDeque<Value>>>,
    introspections: Arc<Mutex<VecDeque<Value>>>,
    access_statuses: Arc<Mutex<VecDeque<Value>>>,
    // Store side.
    session: Arc<Mutex<Value>>,
}

impl Upstreams {
    fn new() -> Self {
        let state = Self::default();
        *state.session.lock().unwrap() = ready_session();
        state
    }

    fn set_session(&self, session: Value) {
        *self.session.lock().unwrap() = session;
    }

    fn script_device_grant(&self, body: Value) {
        self.device_grants.lock().unwrap().push_back(body);
    }

    fn script_device_poll(&self, status: u16, body: Value) {
        self.device_polls.lock().unwrap().push_back((status, body));
    }

    fn script_payment(&self, body: Value) {
        self.payment_responses.lock().unwrap().push_back(body);
    }

    fn script_step_up(&self, body: Value) {
        self.step_up_statuses.lock().unwrap().push_back(body);
    }

    fn script_introspection(&self, body: Value) {
        self.introspections.lock().unwrap().push_back(body);
    }

    fn script_access_status(&self, body: Value) {
        self.access_statuses.lock().unwrap().push_back(body);
    }
}

fn ready_session() -> Value {
    json!({
        "session_id": "sess_1",
        "status": "ready_for_payment",
        "cart": {
            "items": [{"product_id": "prod_1", "quantity": 2, "unit_price": 24.99}],
            "subtotal": 49.98,
            "tax": 6.50,
            "total": 56.48,
            "currency": "CAD"
        },
        "buyer": {"name": "Riley", "email": "shopper@example.com"},
        "fulfillment": {"type": "shipping", "address": {"city": "Toronto"}}
    })
}

fn sample_order() -> Value {
    json!({
        "id": "ord_42",
        "status": "confirmed",
        "total": 56.48,
        "currency": "CAD",
        "items": [],
        "transaction_id": "txn_9"
    })
}

// ---- wallet handlers -------------------------------------------------------

async fn token(
    State(state): State<Upstreams>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if form.get("grant_type").map(String::as_str) == Some("client_credentials") {
        return (
            StatusCode::OK,
            Json(json!({
                "access_token": "tok_session",
                "token_type": "Bearer",
                "expires_in": 3600
            })),
        );
    }
    match state.device_polls.lock().unwrap().pop_front() {
        Some((status, body)) => (StatusCode::from_u16(status).unwrap(), Json(body)),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "unscripted_device_poll"})),
        ),
    }
}

async fn introspect(State(state): State<Upstreams>) -> Json<Value> {
    let scripted = state.introspections.lock().unwrap().pop_front();
    Json(scripted.unwrap_or_else(|| {
        json!({
            "active": true,
            "agent_id": "agent_7",
            "sub": "agent_7",
            "exp": Utc::now().timestamp() + 3600
        })
    }))
}

async fn limits() -> Json<Value> {
    Json(json!({
        "per_transaction": 100,
        "daily": 500,
        "daily_remaining": 463.10,
        "monthly": 1000,
        "monthly_remaining": 820,
        "currency": "CAD"
    }))
}

async fn payment_token(State(state): State<Upstreams>) -> Json<Value> {
    let scripted = state.payment_responses.lock().unwrap().pop_front();
    Json(scripted.unwrap_or_else(|| json!({"payment_token": "ptok_default"})))
}

async fn step_up_status(State(state): State<Upstreams>, Path(_id): Path<String>) -> Json<Value> {
    let scripted = state.step_up_statuses.lock().unwrap().pop_front();
    Json(scripted.unwrap_or_else(|| json!({"status": "pending"})))
}

async fn device_authorization(State(state): State<Upstreams>) -> Json<Value> {
    let scripted = state.device_grants.lock().unwrap().pop_front();
    Json(scripted.unwrap_or_else(|| {
        json!({
            "device_code": "dev_123",
            "user_code": "WSIM-ABC123",
            "verification_uri": "https://wallet.example.com/activate",
            "verification_uri_complete":
                "https://wallet.example.com/activate?code=WSIM-ABC123",
            "expires_in": 300,
            "interval": 5,
            "notification_sent": true
        })
    }))
}

async fn create_access_request() -> Json<Value> {
    Json(json!({
        "request_id": "req_reg_1",
        "expires_at": (Utc::now() + chrono::Duration::minutes(5)).to_rfc3339()
    }))
}

async fn access_request_status(
    State(state): State<Upstreams>,
    Path(_id): Path<String>,
) -> Json<Value> {
    let scripted = state.access_statuses.lock().unwrap().pop_front();
    Json(scripted.unwrap_or_else(|| json!({"status": "pending", "time_remaining_seconds": 290})))
}

// ---- store handlers --------------------------------------------------------

async fn products() -> Json<Value> {
    Json(json!({"products": [{
        "id": "prod_1",
        "name": "Espresso beans",
        "description": "Dark roast, 1kg",
        "price": 24.99,
        "currency": "CAD",
        "category": "coffee"
    }]}))
}

async fn product(Path(id): Path<String>) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if id == "prod_missing" {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "product_not_found",
                "error_description": "No such product"
            })),
        ));
    }
    Ok(Json(json!({
        "id": id,
        "name": "Espresso beans",
        "description": "Dark roast, 1kg",
        "price": 24.99,
        "currency": "CAD"
    })))
}

async fn create_session(State(state): State<Upstreams>) -> Json<Value> {
    Json(state.session.lock().unwrap().clone())
}

async fn get_session(
    State(state): State<Upstreams>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if id == "sess_missing" {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "session_not_found",
                "error_description": "No such checkout session"
            })),
        ));
    }
    Ok(Json(state.session.lock().unwrap().clone()))
}

async fn update_session(State(state): State<Upstreams>) -> Json<Value> {
    Json(state.session.lock().unwrap().clone())
}

async fn complete_session() -> Json<Value> {
    Json(sample_order())
}

async fn cancel_session() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn order() -> Json<Value> {
    Json(sample_order())
}

// =============================================================================
// Harness
// =============================================================================

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

struct Gateway {
    app: Router,
    state: Upstreams,
}

async fn gateway() -> Gateway {
    gateway_with(OrchestratorConfig::default(), None).await
}

async fn gateway_with(config: OrchestratorConfig, public_base_url: Option<String>) -> Gateway {
    let state = Upstreams::new();

    let wallet_app = Router::new()
        .route("/oauth/token", post(token))
        .route("/oauth/introspect", post(introspect))
        .route("/oauth/device_authorization", post(device_authorization))
        .route("/limits", get(limits))
        .route("/payments/token", post(payment_token))
        .route("/payments/token/:id/status", get(step_up_status))
        .route("/access-request", post(create_access_request))
        .route("/access-request/:id", get(access_request_status))
        .with_state(state.clone());
    let store_app = Router::new()
        .route("/products", get(products))
        .route("/products/:id", get(product))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id", patch(update_session))
        .route("/sessions/:id", delete(cancel_session))
        .route("/sessions/:id/complete", post(complete_session))
        .route("/orders/:id", get(order))
        .with_state(state.clone());

    let wallet_url = spawn(wallet_app).await;
    let store_url = spawn(store_app).await;

    let wallet_config = WalletConfig {
        base_url: wallet_url,
        client_id: "agora-gateway".into(),
        client_secret: "s3cret".into(),
        timeout: Duration::from_secs(5),
    };
    let store = StoreClient::new(StoreConfig {
        base_url: store_url,
        timeout: Duration::from_secs(5),
    })
    .unwrap();
    let wallet = WalletClient::new(wallet_config.clone()).unwrap();

    let registry = Arc::new(
        SessionRegistry::in_memory(RegistryConfig {
            wallet: wallet_config,
            ..RegistryConfig::default()
        })
        .unwrap(),
    );
    let orchestrator = Arc::new(CheckoutOrchestrator::new(config, store.clone(), wallet));
    let app_state = Arc::new(AppState::new(registry, orchestrator, store, public_base_url));

    Gateway {
        app: create_test_router(app_state),
        state,
    }
}

/// Make a request and get the JSON response
async fn json_request(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let body = match body {
        Some(json_body) => Body::from(serde_json::to_vec(&json_body).unwrap()),
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(json!(null));
    (status, json)
}

/// Make a request and keep the raw body and headers
async fn raw_request(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, bytes.to_vec())
}

/// Register through the pairing-code flow and return the minted session id.
async fn registered_session(gw: &Gateway) -> String {
    let (status, body) = json_request(
        &gw.app,
        "POST",
        "/auth/register",
        &[],
        Some(json!({"pairing_code": "WSIM-PAIR-123", "agent_name": "Test Agent"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["poll_endpoint"], "/auth/status/req_reg_1");

    gw.state.script_access_status(json!({
        "status": "approved",
        "credentials": {"client_id": "agent_cid", "client_secret": "agent_secret"},
        "agent_id": "agent_7",
        "permissions": ["browse", "cart", "purchase"],
        "spending_limits": {
            "per_transaction": 100,
            "daily": 500,
            "daily_remaining": 500,
            "monthly": 1000,
            "monthly_remaining": 1000,
            "currency": "CAD"
        }
    }));
    let (status, body) = json_request(&gw.app, "GET", "/auth/status/req_reg_1", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["agent_id"], "agent_7");
    body["session_id"].as_str().unwrap().to_string()
}

/// Complete `sess_1` as a guest and return the device-auth request id.
async fn guest_challenge(gw: &Gateway) -> String {
    let (status, body) = json_request(
        &gw.app,
        "POST",
        "/checkout/sess_1/complete",
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "authorization_required");
    body["poll_endpoint"]
        .as_str()
        .unwrap()
        .rsplit('/')
        .next()
        .unwrap()
        .to_string()
}

// =============================================================================
// Public endpoints
// =============================================================================

#[tokio::test]
async fn health_reports_service_identity() {
    let gw = gateway().await;
    let (status, body) = json_request(&gw.app, "GET", "/health", &[], None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "agora-gateway");
    assert!(body["version"].is_string());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn catalog_is_browsable_without_credentials() {
    let gw = gateway().await;

    let (status, body) = json_request(&gw.app, "GET", "/products?q=espresso", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["products"][0]["id"], "prod_1");
    assert_eq!(body["products"][0]["price"], json!(24.99));

    let (status, body) = json_request(&gw.app, "GET", "/products/prod_1", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "prod_1");
}

#[tokio::test]
async fn unknown_product_passes_the_store_error_through() {
    let gw = gateway().await;
    let (status, body) = json_request(&gw.app, "GET", "/products/prod_missing", &[], None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "product_not_found");
    assert_eq!(body["error_description"], "No such product");
}

// =============================================================================
// Registration and sessions
// =============================================================================

#[tokio::test]
async fn registration_requires_pairing_code_and_name() {
    let gw = gateway().await;
    let (status, body) = json_request(
        &gw.app,
        "POST",
        "/auth/register",
        &[],
        Some(json!({"pairing_code": ""})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(
        body["error_description"],
        "pairing_code and agent_name are required"
    );
}

#[tokio::test]
async fn approved_registration_mints_a_usable_session() {
    let gw = gateway().await;
    let session_id = registered_session(&gw).await;

    let (status, body) = json_request(
        &gw.app,
        "GET",
        "/auth/session",
        &[(SESSION_HEADER, session_id.as_str())],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], session_id.as_str());
    assert_eq!(body["agent_id"], "agent_7");
    assert!(body["created_at"].is_string());
}

#[tokio::test]
async fn session_echo_requires_credentials() {
    let gw = gateway().await;
    let (status, body) = json_request(&gw.app, "GET", "/auth/session", &[], None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn unknown_session_id_is_rejected() {
    let gw = gateway().await;
    let (status, body) = json_request(
        &gw.app,
        "GET",
        "/auth/session",
        &[(SESSION_HEADER, "sess_bogus")],
        None,
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn bearer_tokens_resolve_through_introspection() {
    let gw = gateway().await;

    let (status, body) = json_request(
        &gw.app,
        "GET",
        "/auth/session",
        &[("Authorization", "Bearer tok_live")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent_id"], "agent_7");

    // An inactive token is refused outright.
    gw.state.script_introspection(json!({"active": false}));
    let (status, body) = json_request(
        &gw.app,
        "GET",
        "/auth/session",
        &[("Authorization", "Bearer tok_stale")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

// =============================================================================
// Checkout lifecycle
// =============================================================================

#[tokio::test]
async fn create_checkout_requires_items() {
    let gw = gateway().await;
    let (status, body) = json_request(&gw.app, "POST", "/checkout", &[], Some(json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(body["error_description"], "items array is required");
}

#[tokio::test]
async fn guest_builds_a_checkout_with_next_step_hints() {
    let gw = gateway().await;

    let (status, body) = json_request(
        &gw.app,
        "POST",
        "/checkout",
        &[],
        Some(json!({"items": [{"product_id": "prod_1", "quantity": 2}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "sess_1");
    assert_eq!(
        body["next_step"],
        "PATCH /checkout/:session_id with buyer and fulfillment info"
    );

    let (status, body) = json_request(
        &gw.app,
        "PATCH",
        "/checkout/sess_1",
        &[],
        Some(json!({
            "buyer": {"name": "Riley", "email": "shopper@example.com"},
            "fulfillment": {"type": "shipping", "address": {"city": "Toronto"}}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready_for_payment");
    assert_eq!(
        body["next_step"],
        "POST /checkout/:session_id/complete to finalize purchase"
    );

    let (status, body) = json_request(&gw.app, "GET", "/checkout/sess_1", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cart"]["total"], json!(56.48));
    assert!(body.get("next_step").is_none());
}

#[tokio::test]
async fn update_still_building_keeps_the_update_hint() {
    let gw = gateway().await;
    let mut session = ready_session();
    session["status"] = json!("cart_building");
    gw.state.set_session(session);

    let (status, body) = json_request(
        &gw.app,
        "PATCH",
        "/checkout/sess_1",
        &[],
        Some(json!({"items": [{"product_id": "prod_1", "quantity": 3}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["next_step"], "Continue updating checkout");
}

#[tokio::test]
async fn cancelling_a_checkout_reports_cancelled() {
    let gw = gateway().await;
    let (status, body) = json_request(&gw.app, "DELETE", "/checkout/sess_1", &[], None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["session_id"], "sess_1");
}

#[tokio::test]
async fn unknown_checkout_passes_the_store_error_through() {
    let gw = gateway().await;
    let (status, body) = json_request(&gw.app, "GET", "/checkout/sess_missing", &[], None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "session_not_found");
    assert_eq!(body["error_description"], "No such checkout session");
}

#[tokio::test]
async fn completing_an_unready_checkout_names_the_next_step() {
    let gw = gateway().await;
    let mut session = ready_session();
    session["status"] = json!("cart_building");
    gw.state.set_session(session);

    let (status, body) =
        json_request(&gw.app, "POST", "/checkout/sess_1/complete", &[], None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_state");
    assert_eq!(
        body["next_step"],
        "Update checkout with buyer and fulfillment info first"
    );
}

// =============================================================================
// Guest completion and device authorization
// =============================================================================

#[tokio::test]
async fn guest_completion_returns_authorization_instructions() {
    let gw = gateway().await;

    let (status, body) =
        json_request(&gw.app, "POST", "/checkout/sess_1/complete", &[], None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "authorization_required");
    assert_eq!(body["user_code"], "WSIM-ABC123");
    assert_eq!(body["verification_uri"], "https://wallet.example.com/activate");
    assert_eq!(
        body["authorization_url"],
        "https://wallet.example.com/activate?code=WSIM-ABC123"
    );
    assert_eq!(body["expires_in"], 300);
    assert_eq!(body["notification_sent"], true);

    let request_id = body["poll_endpoint"]
        .as_str()
        .unwrap()
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();
    assert!(request_id.starts_with("pay_"));
    assert_eq!(
        body["poll_endpoint"],
        format!("/checkout/sess_1/payment-status/{request_id}").as_str()
    );
    assert_eq!(body["qr_code_url"], format!("/qr/{request_id}").as_str());

    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("We've sent a payment request to your phone."));
    assert!(message.contains("CAD 56.48"));
    assert!(message.contains("WSIM-ABC123"));
}

#[tokio::test]
async fn quiet_device_grant_gets_the_manual_entry_message() {
    let gw = gateway().await;
    gw.state.script_device_grant(json!({
        "device_code": "dev_123",
        "user_code": "WSIM-ABC123",
        "verification_uri": "https://wallet.example.com/activate",
        "expires_in": 300,
        "interval": 5,
        "notification_sent": false
    }));

    let (status, body) =
        json_request(&gw.app, "POST", "/checkout/sess_1/complete", &[], None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["notification_sent"], false);
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("To complete your purchase of CAD 56.48"));
    assert!(message.contains("scan the QR code"));
}

#[tokio::test]
async fn public_base_url_makes_qr_links_absolute() {
    let gw = gateway_with(
        OrchestratorConfig::default(),
        Some("https://agora.example.com/".to_string()),
    )
    .await;

    let (status, body) =
        json_request(&gw.app, "POST", "/checkout/sess_1/complete", &[], None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let qr_url = body["qr_code_url"].as_str().unwrap();
    assert!(qr_url.starts_with("https://agora.example.com/qr/pay_"));
}

#[tokio::test]
async fn payment_status_walks_pending_to_completed() {
    let gw = gateway().await;
    let request_id = guest_challenge(&gw).await;
    let poll_uri = format!("/checkout/sess_1/payment-status/{request_id}");

    gw.state
        .script_device_poll(400, json!({"error": "authorization_pending"}));
    let (status, body) = json_request(&gw.app, "GET", &poll_uri, &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert!(body["expires_in"].as_u64().unwrap() <= 300);
    assert_eq!(
        body["message"],
        "Waiting for user to authorize payment. Enter code WSIM-ABC123 at https://wallet.example.com/activate"
    );

    gw.state.script_device_poll(
        200,
        json!({"access_token": "atok_guest", "token_type": "Bearer", "expires_in": 600}),
    );
    gw.state.script_payment(json!({"payment_token": "ptok_guest"}));
    let (status, body) = json_request(&gw.app, "GET", &poll_uri, &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["order_id"], "ord_42");
    assert_eq!(body["transaction_id"], "txn_9");
    assert_eq!(
        body["message"],
        "Payment authorized and purchase completed successfully!"
    );

    // The settled record is gone; replaying the poll is a 404.
    let (status, body) = json_request(&gw.app, "GET", &poll_uri, &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn denied_payment_reports_rejected_once() {
    let gw = gateway().await;
    let request_id = guest_challenge(&gw).await;
    let poll_uri = format!("/checkout/sess_1/payment-status/{request_id}");

    gw.state
        .script_device_poll(400, json!({"error": "access_denied"}));
    let (status, body) = json_request(&gw.app, "GET", &poll_uri, &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["message"], "User rejected the payment authorization.");

    let (status, _) = json_request(&gw.app, "GET", &poll_uri, &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expired_grant_reports_expired_with_retry_advice() {
    let gw = gateway().await;
    gw.state.script_device_grant(json!({
        "device_code": "dev_stale",
        "user_code": "WSIM-STALE1",
        "verification_uri": "https://wallet.example.com/activate",
        "expires_in": 0
    }));
    let request_id = guest_challenge(&gw).await;

    let (status, body) = json_request(
        &gw.app,
        "GET",
        &format!("/checkout/sess_1/payment-status/{request_id}"),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "expired");
    assert_eq!(
        body["message"],
        "Payment authorization request has expired. Please try again."
    );
}

#[tokio::test]
async fn payment_status_for_the_wrong_checkout_is_refused() {
    let gw = gateway().await;
    let request_id = guest_challenge(&gw).await;

    let (status, body) = json_request(
        &gw.app,
        "GET",
        &format!("/checkout/sess_other/payment-status/{request_id}"),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

// =============================================================================
// QR images
// =============================================================================

#[tokio::test]
async fn qr_serves_png_with_no_store_headers() {
    let gw = gateway().await;
    let request_id = guest_challenge(&gw).await;

    let (status, headers, bytes) = raw_request(&gw.app, &format!("/qr/{request_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        headers[header::CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(&bytes[..8], PNG_MAGIC);
}

#[tokio::test]
async fn unknown_qr_is_not_found() {
    let gw = gateway().await;
    let (status, _, _) = raw_request(&gw.app, "/qr/pay_nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expired_qr_is_gone_then_forgotten() {
    let gw = gateway().await;
    gw.state.script_device_grant(json!({
        "device_code": "dev_stale",
        "user_code": "WSIM-STALE1",
        "verification_uri": "https://wallet.example.com/activate",
        "expires_in": 0
    }));
    let request_id = guest_challenge(&gw).await;
    let uri = format!("/qr/{request_id}");

    let (status, body) = json_request(&gw.app, "GET", &uri, &[], None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "expired");
    assert_eq!(body["error_description"], "QR code has expired");

    let (status, _) = json_request(&gw.app, "GET", &uri, &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Registered completion and step-up
// =============================================================================

#[tokio::test]
async fn registered_completion_within_limits_settles_immediately() {
    let gw = gateway().await;
    let session_id = registered_session(&gw).await;
    gw.state.script_payment(json!({"payment_token": "ptok_a"}));

    let (status, body) = json_request(
        &gw.app,
        "POST",
        "/checkout/sess_1/complete",
        &[(SESSION_HEADER, session_id.as_str())],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["order_id"], "ord_42");
    assert_eq!(body["transaction_id"], "txn_9");
    assert_eq!(body["total"], json!(56.48));
    assert_eq!(body["currency"], "CAD");
    assert_eq!(body["message"], "Purchase completed successfully!");
}

#[tokio::test]
async fn over_limit_completion_walks_the_step_up_flow() {
    let gw = gateway().await;
    let session_id = registered_session(&gw).await;
    let creds: [(&str, &str); 1] = [(SESSION_HEADER, session_id.as_str())];

    gw.state
        .script_payment(json!({"step_up_required": true, "step_up_id": "su_9"}));
    let (status, body) = json_request(
        &gw.app,
        "POST",
        "/checkout/sess_1/complete",
        &creds,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "step_up_required");
    assert_eq!(body["step_up_id"], "su_9");
    assert_eq!(body["poll_endpoint"], "/checkout/sess_1/step-up/su_9");
    assert_eq!(body["amount"], json!(56.48));
    assert_eq!(body["currency"], "CAD");
    assert_eq!(
        body["message"],
        "Purchase exceeds auto-approve limit. User must approve in wallet app."
    );

    // Pending until the user decides.
    let (status, body) =
        json_request(&gw.app, "GET", "/checkout/sess_1/step-up/su_9", &creds, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["message"], "Waiting for user approval...");

    // Approval hands over the payment token and settles in the same poll.
    gw.state
        .script_step_up(json!({"status": "approved", "payment_token": "ptok_b"}));
    let (status, body) =
        json_request(&gw.app, "GET", "/checkout/sess_1/step-up/su_9", &creds, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["order_id"], "ord_42");
    assert_eq!(body["message"], "Step-up approved and purchase completed!");

    // The consumed record is gone.
    let (status, body) =
        json_request(&gw.app, "GET", "/checkout/sess_1/step-up/su_9", &creds, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn rejected_step_up_reports_once() {
    let gw = gateway().await;
    let session_id = registered_session(&gw).await;
    let creds: [(&str, &str); 1] = [(SESSION_HEADER, session_id.as_str())];

    gw.state
        .script_payment(json!({"step_up_required": true, "step_up_id": "su_9"}));
    json_request(&gw.app, "POST", "/checkout/sess_1/complete", &creds, None).await;

    gw.state.script_step_up(json!({"status": "rejected"}));
    let (status, body) =
        json_request(&gw.app, "GET", "/checkout/sess_1/step-up/su_9", &creds, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["message"], "User rejected the purchase.");

    let (status, _) =
        json_request(&gw.app, "GET", "/checkout/sess_1/step-up/su_9", &creds, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn step_up_poll_requires_a_session() {
    let gw = gateway().await;
    let (status, body) =
        json_request(&gw.app, "GET", "/checkout/sess_1/step-up/su_9", &[], None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn bearer_caller_can_complete_within_limits() {
    let gw = gateway().await;
    gw.state.script_payment(json!({"payment_token": "ptok_a"}));

    let (status, body) = json_request(
        &gw.app,
        "POST",
        "/checkout/sess_1/complete",
        &[("Authorization", "Bearer tok_live")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["order_id"], "ord_42");
}

// =============================================================================
// Orders
// =============================================================================

#[tokio::test]
async fn orders_require_a_session() {
    let gw = gateway().await;
    let (status, body) = json_request(&gw.app, "GET", "/orders/ord_42", &[], None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn orders_resolve_for_registered_sessions() {
    let gw = gateway().await;
    let session_id = registered_session(&gw).await;

    let (status, body) = json_request(
        &gw.app,
        "GET",
        "/orders/ord_42",
        &[(SESSION_HEADER, session_id.as_str())],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "ord_42");
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["total"], json!(56.48));
}

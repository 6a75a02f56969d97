//! HTTP client for the merchant store service.
//!
//! The store owns the product catalog, checkout sessions, and orders. This
//! client is a thin wrapper over its REST API: every call optionally carries
//! a bearer token (guest callers send no `Authorization` header at all), and
//! every non-2xx answer is surfaced verbatim as [`StoreError::Upstream`] so
//! the gateway can decide how to translate it. No retries happen here;
//! checkout mutations are not generally idempotent, so retrying is a caller
//! policy.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use agora_types::{CartItem, CheckoutSession, CheckoutUpdate, Order, Product};

/// Default page size for catalog browsing when the caller gives none.
pub const DEFAULT_BROWSE_LIMIT: u32 = 20;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store answered with a non-2xx status. The body is preserved
    /// verbatim so callers can pass it through unchanged.
    #[error("store returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("store request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid store client configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// HTTP status of an upstream rejection, if that is what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Raw upstream response body, if one was captured.
    pub fn body(&self) -> Option<&str> {
        match self {
            StoreError::Upstream { body, .. } => Some(body),
            _ => None,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the store service, without a trailing slash.
    pub base_url: String,
    /// Request timeout applied to every call.
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client for the store's checkout API.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct StoreClient {
    config: Arc<StoreConfig>,
    client: Client,
}

impl StoreClient {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let config = StoreConfig {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ..config
        };

        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Search the product catalog.
    pub async fn browse_products(
        &self,
        query: Option<&str>,
        category: Option<&str>,
        limit: Option<u32>,
        bearer: Option<&str>,
    ) -> StoreResult<Vec<Product>> {
        #[derive(Deserialize)]
        struct ProductsResponse {
            products: Vec<Product>,
        }

        let mut params: Vec<(&str, String)> = vec![(
            "limit",
            limit.unwrap_or(DEFAULT_BROWSE_LIMIT).to_string(),
        )];
        if let Some(q) = query {
            params.push(("q", q.to_string()));
        }
        if let Some(category) = category {
            params.push(("category", category.to_string()));
        }

        let req = self.request(Method::GET, "/products", bearer).query(&params);
        let resp: ProductsResponse = self.send(req).await?;
        tracing::debug!(count = resp.products.len(), "browsed store catalog");
        Ok(resp.products)
    }

    pub async fn get_product(&self, id: &str, bearer: Option<&str>) -> StoreResult<Product> {
        let req = self.request(Method::GET, &format!("/products/{id}"), bearer);
        self.send(req).await
    }

    /// Open a new checkout session with an initial set of items.
    pub async fn create_checkout(
        &self,
        items: &[CartItem],
        bearer: Option<&str>,
    ) -> StoreResult<CheckoutSession> {
        #[derive(Serialize)]
        struct CreateCheckoutRequest<'a> {
            items: &'a [CartItem],
        }

        let req = self
            .request(Method::POST, "/sessions", bearer)
            .json(&CreateCheckoutRequest { items });
        let session: CheckoutSession = self.send(req).await?;
        tracing::debug!(session_id = %session.session_id, "created checkout session");
        Ok(session)
    }

    pub async fn get_checkout(
        &self,
        id: &str,
        bearer: Option<&str>,
    ) -> StoreResult<CheckoutSession> {
        let req = self.request(Method::GET, &format!("/sessions/{id}"), bearer);
        self.send(req).await
    }

    /// Apply a partial update; the store recomputes totals.
    pub async fn update_checkout(
        &self,
        id: &str,
        update: &CheckoutUpdate,
        bearer: Option<&str>,
    ) -> StoreResult<CheckoutSession> {
        let req = self
            .request(Method::PATCH, &format!("/sessions/{id}"), bearer)
            .json(update);
        self.send(req).await
    }

    /// Finalize a checkout with an approved payment token, producing an order.
    pub async fn complete_checkout(
        &self,
        id: &str,
        payment_token: &str,
        mandate_id: Option<&str>,
        bearer: Option<&str>,
    ) -> StoreResult<Order> {
        #[derive(Serialize)]
        struct CompleteCheckoutRequest<'a> {
            payment_token: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            mandate_id: Option<&'a str>,
        }

        let req = self
            .request(Method::POST, &format!("/sessions/{id}/complete"), bearer)
            .json(&CompleteCheckoutRequest {
                payment_token,
                mandate_id,
            });
        let order: Order = self.send(req).await?;
        tracing::debug!(session_id = id, order_id = %order.id, "completed checkout");
        Ok(order)
    }

    pub async fn cancel_checkout(&self, id: &str, bearer: Option<&str>) -> StoreResult<()> {
        let req = self.request(Method::DELETE, &format!("/sessions/{id}"), bearer);
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(StoreError::Upstream {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    pub async fn get_order(&self, id: &str, bearer: Option<&str>) -> StoreResult<Order> {
        let req = self.request(Method::GET, &format!("/orders/{id}"), bearer);
        self.send(req).await
    }

    fn request(&self, method: Method, path: &str, bearer: Option<&str>) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> StoreResult<T> {
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(StoreError::Upstream {
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

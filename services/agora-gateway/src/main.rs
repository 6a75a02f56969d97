//! Agora Gateway Server
//!
//! HTTP gateway that lets AI agents shop a merchant catalog and settle
//! checkouts through the user's wallet.
//!
//! # Features
//!
//! - Session and bearer-token authentication against the wallet service
//! - Guest checkout settled via OAuth device authorization (RFC 8628)
//! - Step-up escalation for purchases above auto-approve limits
//! - QR codes and signed deep links for wallet approval
//! - Graceful shutdown handling
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings
//! agora-gateway
//!
//! # Start with custom config
//! agora-gateway --config /path/to/config.toml
//!
//! # Start with environment overrides
//! AGORA__SERVER__PORT=8080 agora-gateway
//! ```

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agora_api::{create_router, ApiConfig, AppState};
use agora_checkout::CheckoutOrchestrator;
use agora_session::SessionRegistry;
use agora_store::StoreClient;
use agora_wallet::WalletClient;

use crate::config::GatewayConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Agora Gateway - agent checkouts settled through user wallets
#[derive(Parser, Debug)]
#[command(name = "agora-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "AGORA_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "AGORA_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "AGORA_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "AGORA_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (json, pretty)
    #[arg(long, env = "AGORA_LOG_FORMAT", default_value = "pretty")]
    log_format: String,

    /// Merchant store base URL
    #[arg(long, env = "STORE_BASE_URL")]
    store_url: Option<String>,

    /// Wallet service base URL
    #[arg(long, env = "WALLET_BASE_URL")]
    wallet_url: Option<String>,

    /// OAuth client secret for the wallet service
    #[arg(long, env = "WALLET_CLIENT_SECRET")]
    wallet_client_secret: Option<String>,

    /// External base URL for QR links
    #[arg(long, env = "GATEWAY_BASE_URL")]
    public_base_url: Option<String>,

    /// Enable development mode (relaxed security)
    #[arg(long, env = "AGORA_DEV_MODE")]
    dev_mode: bool,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let mut gateway_config = GatewayConfig::load(args.config.as_deref())?;

    // Override with CLI arguments
    if let Some(host) = args.host {
        gateway_config.server.host = host;
    }
    if let Some(port) = args.port {
        gateway_config.server.port = port;
    }
    if let Some(store_url) = args.store_url {
        gateway_config.store.base_url = store_url;
    }
    if let Some(wallet_url) = args.wallet_url {
        gateway_config.wallet.base_url = wallet_url;
    }
    if let Some(secret) = args.wallet_client_secret {
        gateway_config.wallet.client_secret = secret;
    }
    if let Some(base_url) = args.public_base_url {
        gateway_config.api.public_base_url = Some(base_url);
    }
    gateway_config.logging.level = args.log_level;
    gateway_config.logging.format = args.log_format;

    // Initialize logging
    init_logging(&gateway_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Agora gateway"
    );

    // Validate configuration
    validate_config(&gateway_config, args.dev_mode)?;

    // Initialize upstream clients
    let store = StoreClient::new(gateway_config.store.client_config())?;
    let wallet_config = gateway_config.wallet.client_config();
    let wallet = WalletClient::new(wallet_config.clone())?;

    tracing::info!(
        store = %gateway_config.store.base_url,
        wallet = %gateway_config.wallet.base_url,
        "Upstream clients ready"
    );

    // Initialize session registry and checkout orchestration
    let registry = Arc::new(SessionRegistry::in_memory(
        gateway_config.registration.registry_config(wallet_config),
    )?);
    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        gateway_config.checkout.orchestrator_config(),
        store.clone(),
        wallet,
    ));

    // Sweep expired pending records and sessions in the background
    spawn_sweeper(
        orchestrator.clone(),
        registry.clone(),
        gateway_config.checkout.sweep_interval(),
    );

    // Create application state
    let state = Arc::new(AppState::new(
        registry,
        orchestrator,
        store,
        gateway_config.api.public_base_url.clone(),
    ));

    // Create API configuration
    let api_config = ApiConfig {
        enable_cors: gateway_config.api.enable_cors,
        cors_origins: gateway_config.api.cors_origins.clone(),
        enable_tracing: gateway_config.api.enable_tracing,
    };

    // Create router
    let app = create_router(state, api_config);

    // Get bind address
    let addr = gateway_config.server.socket_addr()?;

    tracing::info!(
        host = %gateway_config.server.host,
        port = %gateway_config.server.port,
        "Gateway listening"
    );

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            gateway_config.server.shutdown_timeout(),
        ))
        .await?;

    tracing::info!("Gateway shutdown complete");

    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber.with(fmt::layer().json().with_target(true)).init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }

    Ok(())
}

/// Validate configuration
fn validate_config(config: &GatewayConfig, dev_mode: bool) -> anyhow::Result<()> {
    // Check wallet credentials in production
    if !dev_mode && config.wallet.client_secret == "change-me-in-production" {
        anyhow::bail!(
            "Wallet client secret must be changed in production. Set WALLET_CLIENT_SECRET."
        );
    }

    if !dev_mode && config.checkout.deep_link_secret.is_none() {
        tracing::warn!("No deep-link secret configured; wallet deep links are unsigned");
    }

    if config.api.public_base_url.is_none() {
        tracing::warn!("No public base URL configured; QR links will be relative");
    }

    Ok(())
}

/// Periodically drop expired pending authorizations, step-ups, and sessions.
fn spawn_sweeper(
    orchestrator: Arc<CheckoutOrchestrator>,
    registry: Arc<SessionRegistry>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let pending = orchestrator.sweep_expired().await;
            let sessions = registry.sweep_expired().await;
            if pending > 0 || sessions > 0 {
                tracing::debug!(pending, sessions, "swept expired records");
            }
        }
    });
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    // Allow time for in-flight requests to complete
    tracing::info!(
        timeout_secs = timeout.as_secs(),
        "Waiting for in-flight requests to complete..."
    );

    tokio::time::sleep(timeout).await;
}

// =============================================================================
// Tests
// =============================================================================

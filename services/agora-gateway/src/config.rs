//! Gateway Configuration
//!
//! Configuration management for the Agora gateway server.
//! Supports environment variables, config files, and CLI arguments.

use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use agora_checkout::OrchestratorConfig;
use agora_session::RegistryConfig;
use agora_store::StoreConfig;
use agora_wallet::{RequestedLimits, WalletConfig};
use rust_decimal::Decimal;

/// Gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Server binding configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Merchant store upstream
    #[serde(default)]
    pub store: StoreSettings,

    /// Wallet service upstream
    #[serde(default)]
    pub wallet: WalletSettings,

    /// Pairing-code registration defaults
    #[serde(default)]
    pub registration: RegistrationSettings,

    /// Checkout orchestration
    #[serde(default)]
    pub checkout: CheckoutSettings,

    /// API configuration
    #[serde(default)]
    pub api: ApiSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server binding settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shutdown drain time in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerSettings {
    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port).parse()?;
        Ok(addr)
    }

    /// Get the shutdown drain duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Merchant store upstream settings
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Store API base URL
    #[serde(default = "default_store_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            base_url: default_store_url(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

impl StoreSettings {
    pub fn client_config(&self) -> StoreConfig {
        StoreConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Wallet service upstream settings
#[derive(Clone, Deserialize)]
pub struct WalletSettings {
    /// Wallet API base URL
    #[serde(default = "default_wallet_url")]
    pub base_url: String,

    /// OAuth client id of this gateway
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// OAuth client secret of this gateway
    #[serde(default = "default_client_secret")]
    pub client_secret: String,

    /// Request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            base_url: default_wallet_url(),
            client_id: default_client_id(),
            client_secret: default_client_secret(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

impl WalletSettings {
    pub fn client_config(&self) -> WalletConfig {
        WalletConfig {
            base_url: self.base_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

// Secret material must never reach log output.
impl fmt::Debug for WalletSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSettings")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Pairing-code registration settings
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationSettings {
    /// Permissions requested for newly registered agents
    #[serde(default = "default_permissions")]
    pub permissions: Vec<String>,

    /// Proposed per-transaction spending limit
    #[serde(default = "default_per_transaction")]
    pub per_transaction: Decimal,

    /// Proposed daily spending limit
    #[serde(default = "default_daily")]
    pub daily: Option<Decimal>,

    /// Proposed monthly spending limit
    #[serde(default = "default_monthly")]
    pub monthly: Option<Decimal>,

    /// Currency the proposed limits are denominated in
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Agent description used when the caller gives none
    #[serde(default = "default_agent_description")]
    pub default_agent_description: String,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            permissions: default_permissions(),
            per_transaction: default_per_transaction(),
            daily: default_daily(),
            monthly: default_monthly(),
            currency: default_currency(),
            default_agent_description: default_agent_description(),
        }
    }
}

impl RegistrationSettings {
    pub fn registry_config(&self, wallet: WalletConfig) -> RegistryConfig {
        RegistryConfig {
            wallet,
            registration_permissions: self.permissions.clone(),
            registration_limits: RequestedLimits {
                per_transaction: self.per_transaction,
                daily: self.daily,
                monthly: self.monthly,
                currency: self.currency.clone(),
            },
            default_agent_description: self.default_agent_description.clone(),
        }
    }
}

/// Checkout orchestration settings
#[derive(Clone, Deserialize)]
pub struct CheckoutSettings {
    /// Merchant account the wallet debits against
    #[serde(default = "default_merchant_id")]
    pub merchant_id: String,

    /// Shared secret for signing wallet deep links
    #[serde(default)]
    pub deep_link_secret: Option<String>,

    /// Name fronted to users on guest device authorizations
    #[serde(default = "default_gateway_name")]
    pub gateway_name: String,

    /// Device-authorization lifetime when the wallet reports none, in seconds
    #[serde(default = "default_device_auth_expiry")]
    pub device_auth_expiry_secs: u64,

    /// Step-up record lifetime when the wallet reports no expiry, in seconds
    #[serde(default = "default_step_up_expiry")]
    pub step_up_expiry_secs: u64,

    /// Poll interval when the wallet reports none, in seconds
    #[serde(default = "default_poll_interval")]
    pub default_poll_interval_secs: u64,

    /// Ceiling for slow_down backoff, in seconds
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval_secs: u64,

    /// How often expired pending records are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            merchant_id: default_merchant_id(),
            deep_link_secret: None,
            gateway_name: default_gateway_name(),
            device_auth_expiry_secs: default_device_auth_expiry(),
            step_up_expiry_secs: default_step_up_expiry(),
            default_poll_interval_secs: default_poll_interval(),
            max_poll_interval_secs: default_max_poll_interval(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl CheckoutSettings {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            merchant_id: self.merchant_id.clone(),
            deep_link_secret: self.deep_link_secret.clone(),
            gateway_name: self.gateway_name.clone(),
            device_auth_expiry_secs: self.device_auth_expiry_secs,
            step_up_expiry_secs: self.step_up_expiry_secs,
            default_poll_interval_secs: self.default_poll_interval_secs,
            max_poll_interval_secs: self.max_poll_interval_secs,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// Secret material must never reach log output.
impl fmt::Debug for CheckoutSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutSettings")
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
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .finish()
    }
}

/// API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// CORS allowed origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable request tracing
    #[serde(default = "default_true")]
    pub enable_tracing: bool,

    /// External base URL used when building absolute QR links
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enable_cors: true,
            cors_origins: default_cors_origins(),
            enable_tracing: true,
            public_base_url: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_shutdown_timeout() -> u64 {
    10
}

fn default_store_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_wallet_url() -> String {
    "http://localhost:8082".to_string()
}

fn default_client_id() -> String {
    "agora-gateway".to_string()
}

fn default_client_secret() -> String {
    "change-me-in-production".to_string()
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_permissions() -> Vec<String> {
    vec![
        "browse".to_string(),
        "cart".to_string(),
        "purchase".to_string(),
    ]
}

fn default_per_transaction() -> Decimal {
    Decimal::from(100)
}

fn default_daily() -> Option<Decimal> {
    Some(Decimal::from(500))
}

fn default_monthly() -> Option<Decimal> {
    Some(Decimal::from(1000))
}

fn default_currency() -> String {
    "CAD".to_string()
}

fn default_agent_description() -> String {
    "AI shopping assistant".to_string()
}

fn default_merchant_id() -> String {
    "store_banksim_ca".to_string()
}

fn default_gateway_name() -> String {
    "Agora Gateway".to_string()
}

fn default_device_auth_expiry() -> u64 {
    300
}

fn default_step_up_expiry() -> u64 {
    900
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_poll_interval() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl GatewayConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        // Add config file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add default config locations
        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        // Add environment variables with AGORA_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("AGORA")
                .separator("__")
                .try_parsing(true),
        );

        // Build and deserialize
        let config = builder.build()?;

        // Try to deserialize, falling back to defaults where needed
        let gateway_config: GatewayConfig = config.try_deserialize().unwrap_or_else(|_| {
            tracing::warn!("Using default configuration - some settings may need adjustment");
            GatewayConfig::default()
        });

        Ok(gateway_config)
    }

    /// Create a configuration for development/testing
    pub fn development() -> Self {
        Self {
            server: ServerSettings::default(),
            store: StoreSettings::default(),
            wallet: WalletSettings::default(),
            registration: RegistrationSettings::default(),
            checkout: CheckoutSettings::default(),
            api: ApiSettings::default(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    /// Create a configuration for production
    pub fn production() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
                shutdown_timeout_secs: 30,
            },
            store: StoreSettings {
                base_url: "https://store.banksim.ca/api/agent/v1".to_string(),
                ..StoreSettings::default()
            },
            wallet: WalletSettings {
                base_url: "https://wallet.banksim.ca/api/agent/v1".to_string(),
                client_secret: std::env::var("AGORA__WALLET__CLIENT_SECRET")
                    .expect("AGORA__WALLET__CLIENT_SECRET must be set in production"),
                ..WalletSettings::default()
            },
            registration: RegistrationSettings::default(),
            checkout: CheckoutSettings::default(),
            api: ApiSettings {
                cors_origins: vec!["https://agora.banksim.ca".to_string()],
                public_base_url: Some("https://agora.banksim.ca".to_string()),
                ..ApiSettings::default()
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::development()
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use url::Url;
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/";
const DEFAULT_GATEWAY_URL: &str = "https://pay.example.com/";
const DEFAULT_RETURN_URL: &str = "http://localhost:3000/user/payment";
const DEFAULT_PG_PROVIDER: &str = "html5_inicis";
const DEFAULT_PAY_METHOD: &str = "card";
const DEFAULT_HOME_ROUTE: &str = "/";
const DEFAULT_ORDER_STATUS_ROUTE: &str = "/user/order-status";
const DEFAULT_FAILURE_REDIRECT_DELAY_MS: u64 = 3000;
const DEFAULT_MOBILE_BREAKPOINT_PX: u32 = 768;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Logging configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive for the subscriber ("info", "food_checkout=debug", ...)
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Checkout client configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CheckoutConfig {
    /// Base URL of the delivery backend REST API
    #[validate(url)]
    pub api_base_url: String,

    /// Base URL of the hosted payment gateway API
    #[validate(url)]
    pub payment_gateway_url: String,

    /// Merchant identification code issued by the payment gateway
    #[validate(length(min = 1))]
    pub merchant_code: String,

    /// PG provider identifier passed through to the gateway
    #[serde(default = "default_pg_provider")]
    pub pg_provider: String,

    /// Payment method requested from the gateway
    #[serde(default = "default_pay_method")]
    pub payment_method: String,

    /// Page the gateway returns the browser to after a redirect
    #[validate(url)]
    pub return_url: String,

    /// Safe default view after a failed checkout
    #[serde(default = "default_home_route")]
    pub home_route: String,

    /// View that shows a confirmed order
    #[serde(default = "default_order_status_route")]
    pub order_status_route: String,

    /// Delay before leaving a failed checkout screen
    #[serde(default = "default_failure_redirect_delay_ms")]
    #[validate(range(max = 60000))]
    pub failure_redirect_delay_ms: u64,

    /// Viewports narrower than this use the redirect payment flow
    #[serde(default = "default_mobile_breakpoint_px")]
    #[validate(range(min = 1))]
    pub mobile_breakpoint_px: u32,

    /// HTTP request timeout for backend and gateway calls
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// Bearer token forwarded to the backend, if the user is signed in
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default)]
    #[validate]
    pub logging: LoggingConfig,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            payment_gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            merchant_code: "imp00000000".to_string(),
            pg_provider: default_pg_provider(),
            payment_method: default_pay_method(),
            return_url: DEFAULT_RETURN_URL.to_string(),
            home_route: default_home_route(),
            order_status_route: default_order_status_route(),
            failure_redirect_delay_ms: default_failure_redirect_delay_ms(),
            mobile_breakpoint_px: default_mobile_breakpoint_px(),
            request_timeout_secs: default_request_timeout_secs(),
            auth_token: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl CheckoutConfig {
    pub fn failure_redirect_delay(&self) -> Duration {
        Duration::from_millis(self.failure_redirect_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parsed return URL. Validation guarantees it parses for loaded configs.
    pub fn return_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.return_url)
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_pg_provider() -> String {
    DEFAULT_PG_PROVIDER.to_string()
}

fn default_pay_method() -> String {
    DEFAULT_PAY_METHOD.to_string()
}

fn default_home_route() -> String {
    DEFAULT_HOME_ROUTE.to_string()
}

fn default_order_status_route() -> String {
    DEFAULT_ORDER_STATUS_ROUTE.to_string()
}

fn default_failure_redirect_delay_ms() -> u64 {
    DEFAULT_FAILURE_REDIRECT_DELAY_MS
}

fn default_mobile_breakpoint_px() -> u32 {
    DEFAULT_MOBILE_BREAKPOINT_PX
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    // Full filter directives ("food_checkout=debug,info") are passed through.
    if level.contains('=') || valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Loads configuration from defaults, optional `config/` files and
/// `APP__`-prefixed environment variables.
pub fn load_config() -> Result<CheckoutConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("api_base_url", DEFAULT_API_BASE_URL)?
        .set_default("payment_gateway_url", DEFAULT_GATEWAY_URL)?
        .set_default("merchant_code", "imp00000000")?
        .set_default("return_url", DEFAULT_RETURN_URL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let checkout_config: CheckoutConfig = config.try_deserialize()?;

    checkout_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(checkout_config)
}

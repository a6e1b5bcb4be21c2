use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::middleware_helpers::retry::RetryConfig;
use crate::services::commerce::cart_commit_service::DEFAULT_RETRY_URL_BASE;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// External checkout connection settings (`[checkout]` table, `APP__CHECKOUT__*`).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CheckoutApiConfig {
    /// `live` talks to the vendor over HTTP, `mock` uses the in-process simulator
    #[serde(default = "default_checkout_mode")]
    #[validate(custom = "validate_checkout_mode")]
    pub mode: String,

    pub base_url: Option<String>,

    pub api_key: Option<String>,

    /// Per-attempt timeout
    #[serde(default = "default_checkout_timeout_ms")]
    #[validate(range(min = 1, max = 120000))]
    pub timeout_ms: u64,

    /// Total attempts per add-to-cart call
    #[serde(default = "default_checkout_retry_count")]
    #[validate(range(min = 1, max = 10))]
    pub retry_count: u32,

    #[serde(default = "default_checkout_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_checkout_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    #[serde(default = "default_checkout_health_timeout_ms")]
    #[validate(range(min = 1, max = 60000))]
    pub health_timeout_ms: u64,

    #[serde(default)]
    pub mock_latency_ms: u64,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub mock_failure_rate: f64,

    pub mock_seed: Option<u64>,
}

impl Default for CheckoutApiConfig {
    fn default() -> Self {
        Self {
            mode: default_checkout_mode(),
            base_url: None,
            api_key: None,
            timeout_ms: default_checkout_timeout_ms(),
            retry_count: default_checkout_retry_count(),
            retry_base_delay_ms: default_checkout_retry_base_delay_ms(),
            retry_max_delay_ms: default_checkout_retry_max_delay_ms(),
            health_timeout_ms: default_checkout_health_timeout_ms(),
            mock_latency_ms: 0,
            mock_failure_rate: 0.0,
            mock_seed: None,
        }
    }
}

impl CheckoutApiConfig {
    pub fn is_mock(&self) -> bool {
        self.mode.eq_ignore_ascii_case("mock")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_count,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            ..RetryConfig::default()
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Run pending migrations at startup
    #[serde(default = "default_true_bool")]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Process secret, 64 hex chars or base64 of 32 bytes. Required in production.
    pub secret_key: Option<String>,

    #[serde(default = "default_csrf_max_age_secs")]
    pub csrf_max_age_secs: u64,

    /// Lifetime of handoff tokens issued after a successful commit
    #[serde(default = "default_auth_token_ttl_secs")]
    #[validate(range(min = 1))]
    pub auth_token_ttl_secs: i64,

    /// Absolute tolerance between client and server price
    #[serde(default = "default_price_tolerance")]
    #[validate(range(min = 0.0))]
    pub price_tolerance: f64,

    /// Prefix of the retry link returned with a fallback outcome
    #[serde(default = "default_retry_url_base")]
    pub retry_url_base: String,

    /// Comma separated list of allowed CORS origins
    pub cors_allowed_origins: Option<String>,

    #[serde(default)]
    #[validate]
    pub checkout: CheckoutApiConfig,
}

impl AppConfig {
    /// Configuration with built-in defaults for the given database.
    pub fn new(database_url: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: default_host(),
            port: DEFAULT_PORT,
            environment: environment.into(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            secret_key: None,
            csrf_max_age_secs: default_csrf_max_age_secs(),
            auth_token_ttl_secs: default_auth_token_ttl_secs(),
            price_tolerance: default_price_tolerance(),
            retry_url_base: default_retry_url_base(),
            cors_allowed_origins: None,
            checkout: CheckoutApiConfig::default(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn csrf_max_age(&self) -> Duration {
        Duration::from_secs(self.csrf_max_age_secs)
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.checkout.is_mock() {
            let missing = |value: &Option<String>| {
                value.as_deref().map(str::trim).map_or(true, str::is_empty)
            };
            if missing(&self.checkout.base_url) {
                let mut err = ValidationError::new("checkout_base_url_required");
                err.message = Some("Set APP__CHECKOUT__BASE_URL when checkout mode is live".into());
                errors.add("checkout.base_url", err);
            }
            if missing(&self.checkout.api_key) {
                let mut err = ValidationError::new("checkout_api_key_required");
                err.message = Some("Set APP__CHECKOUT__API_KEY when checkout mode is live".into());
                errors.add("checkout.api_key", err);
            }
        }

        if self.is_production() && self.checkout.is_mock() {
            let mut err = ValidationError::new("checkout_mock_in_production");
            err.message = Some("The mock checkout must not be used in production".into());
            errors.add("checkout.mode", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
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
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_true_bool() -> bool {
    true
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    30
}
fn default_csrf_max_age_secs() -> u64 {
    3600
}
fn default_auth_token_ttl_secs() -> i64 {
    3600
}
fn default_price_tolerance() -> f64 {
    0.01
}
fn default_retry_url_base() -> String {
    DEFAULT_RETRY_URL_BASE.to_string()
}
fn default_checkout_mode() -> String {
    "live".to_string()
}
fn default_checkout_timeout_ms() -> u64 {
    10_000
}
fn default_checkout_retry_count() -> u32 {
    3
}
fn default_checkout_retry_base_delay_ms() -> u64 {
    1_000
}
fn default_checkout_retry_max_delay_ms() -> u64 {
    10_000
}
fn default_checkout_health_timeout_ms() -> u64 {
    5_000
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_checkout_mode(mode: &str) -> Result<(), ValidationError> {
    if mode.eq_ignore_ascii_case("live") || mode.eq_ignore_ascii_case("mock") {
        Ok(())
    } else {
        let mut err = ValidationError::new("checkout_mode");
        err.message = Some("Must be one of: live, mock".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("configurator_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("database_url", "sqlite://configurator.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)
}

fn finish(config: Config) -> Result<AppConfig, AppConfigError> {
    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*, nested tables with `__`)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
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

    let config = builder_with_defaults()?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config = finish(config)?;
    info!("Configuration loaded successfully");
    Ok(app_config)
}

/// Loads configuration from a TOML document layered over the built-in defaults.
pub fn load_config_from_str(toml: &str) -> Result<AppConfig, AppConfigError> {
    let config = builder_with_defaults()?
        .add_source(File::from_str(toml, config::FileFormat::Toml))
        .build()?;
    finish(config)
}

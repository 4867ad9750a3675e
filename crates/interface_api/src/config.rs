//! API configuration
//!
//! Values come from `API_`-prefixed environment variables (a `.env` file is
//! loaded first by the server binary). Anything unset keeps its default.

use anyhow::ensure;
use serde::Deserialize;

use core_kernel::Timezone;
use domain_billing::adapters::{EmailRelayConfig, StripeConfig};

/// Placeholder secret; the server refuses to start with it
pub const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// HMAC secret the portal's auth service signs tokens with
    pub jwt_secret: String,
    /// Lifetime of tokens minted by [`crate::auth::create_token`]
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    pub database_max_connections: u32,
    /// Log level
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,

    pub stripe_secret_key: String,
    pub stripe_base_url: String,

    pub email_endpoint: String,
    pub email_api_key: String,
    pub email_from: String,

    /// Printed in every email
    pub agency_name: String,
    /// Dates in emails and the "today" of visit notes use this zone
    pub agency_timezone: Timezone,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/homecare".to_string(),
            database_max_connections: 10,
            log_level: "info".to_string(),
            log_json: false,
            stripe_secret_key: String::new(),
            stripe_base_url: "https://api.stripe.com".to_string(),
            email_endpoint: "http://localhost:8025/api/send".to_string(),
            email_api_key: String::new(),
            email_from: "Home Care Billing <billing@localhost>".to_string(),
            agency_name: "Home Care Agency".to_string(),
            agency_timezone: Timezone::default(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Fails unless `API_JWT_SECRET` was set to a real secret
    pub fn ensure_jwt_secret(&self) -> anyhow::Result<()> {
        let secret = self.jwt_secret.trim();
        ensure!(!secret.is_empty(), "API_JWT_SECRET is empty");
        ensure!(
            secret != DEFAULT_JWT_SECRET,
            "API_JWT_SECRET is not set; refusing to accept tokens signed with the placeholder secret"
        );
        Ok(())
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn stripe(&self) -> StripeConfig {
        StripeConfig::new(self.stripe_secret_key.clone()).with_base_url(self.stripe_base_url.clone())
    }

    pub fn email_relay(&self) -> EmailRelayConfig {
        EmailRelayConfig {
            endpoint: self.email_endpoint.clone(),
            api_key: self.email_api_key.clone(),
            from: self.email_from.clone(),
            ..Default::default()
        }
    }
}

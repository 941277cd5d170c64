//! Configuration management for the retail POS server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with RPOS_ prefix (e.g. RPOS__JWT__SECRET)

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::StoreInfo;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Log output format: "pretty" or "json"
    pub log_format: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Store details and pricing
    pub store: StoreConfig,

    /// Outbound email configuration
    pub email: EmailConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for signing JWT tokens
    pub secret: String,

    /// Access token expiration in seconds
    pub access_token_expiry: i64,

    /// Refresh token expiration in seconds
    pub refresh_token_expiry: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    /// ISO currency code printed on receipts
    pub currency: String,
    /// Sales tax as a fraction, e.g. 0.07
    pub tax_rate: Decimal,
    pub receipt_footer: Option<String>,
}

impl StoreConfig {
    pub fn store_info(&self) -> StoreInfo {
        StoreInfo {
            name: self.name.clone(),
            address: self.address.clone(),
            phone: self.phone.clone(),
            currency: self.currency.clone(),
            footer: self.receipt_footer.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    /// HTTP endpoint of the email provider
    pub api_endpoint: String,

    /// Provider API key; when empty, emails are logged instead of sent
    pub api_key: Option<String>,

    /// Sender address
    pub from_address: String,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("RPOS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("log_format", "pretty")?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("jwt.access_token_expiry", 3600)?
            .set_default("jwt.refresh_token_expiry", 604800)?
            .set_default("store.name", "Retail Store")?
            .set_default("store.currency", "USD")?
            .set_default("store.tax_rate", "0")?
            .set_default("email.api_endpoint", "https://api.resend.com/emails")?
            .set_default("email.from_address", "no-reply@localhost")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (RPOS_ prefix)
            .add_source(
                Environment::with_prefix("RPOS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        shared::validate_tax_rate(self.store.tax_rate)
            .map_err(|e| ConfigError::Message(format!("store.tax_rate: {}", e)))?;
        if self.environment == "production" && self.jwt.secret.len() < 32 {
            return Err(ConfigError::Message(
                "jwt.secret must be at least 32 characters in production".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

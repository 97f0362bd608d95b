use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// One-time magic link lifetime. Must be strictly shorter than the
    /// session lifetime so a leaked link is worth less than a session.
    #[serde(default = "default_magic_link_ttl_hours")]
    pub magic_link_ttl_hours: i64,
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
    /// Trial window granted on first redemption.
    #[serde(default = "default_trial_hours")]
    pub trial_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            magic_link_ttl_hours: default_magic_link_ttl_hours(),
            session_ttl_days: default_session_ttl_days(),
            trial_hours: default_trial_hours(),
        }
    }
}

fn default_magic_link_ttl_hours() -> i64 {
    24
}

fn default_session_ttl_days() -> i64 {
    7
}

fn default_trial_hours() -> i64 {
    48
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            base_url: default_base_url(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_email() -> String {
    "noreply@solace.app".to_string()
}

fn default_from_name() -> String {
    "Solace".to_string()
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StripeConfig {
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default)]
    pub price_id_monthly: String,
    #[serde(default)]
    pub price_id_annual: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_email_max")]
    pub email_max_per_window: u32,
    #[serde(default = "default_email_window")]
    pub email_window_seconds: i64,
    #[serde(default = "default_ip_max")]
    pub ip_max_per_window: u32,
    #[serde(default = "default_ip_window")]
    pub ip_window_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            email_max_per_window: default_email_max(),
            email_window_seconds: default_email_window(),
            ip_max_per_window: default_ip_max(),
            ip_window_seconds: default_ip_window(),
        }
    }
}

fn default_email_max() -> u32 {
    3
}

fn default_email_window() -> i64 {
    3600
}

fn default_ip_max() -> u32 {
    10
}

fn default_ip_window() -> i64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (SOLACE__DATABASE__URL, etc.)
    /// 2. Config file specified by path
    /// 3. Hardcoded defaults
    pub fn load(config_path: Option<String>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        builder = builder
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("database.url", "sqlite:solace.db")?
            .set_default("database.max_connections", 5)?;

        let config_file_path = config_path
            .or_else(|| env::var("CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/default.toml".to_string());

        // Config file is optional; defaults plus env vars are enough to run.
        if std::path::Path::new(&config_file_path).exists() {
            builder = builder.add_source(File::with_name(&config_file_path));
        }

        builder = builder.add_source(
            Environment::with_prefix("SOLACE")
                .separator("__")
                .try_parsing(true),
        );

        // Legacy environment variables without prefix, for deployment
        // platforms that inject these names directly.
        if let Ok(database_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", database_url)?;
        }
        if let Ok(stripe_secret) = env::var("STRIPE_SECRET_KEY") {
            builder = builder.set_override("stripe.secret_key", stripe_secret)?;
        }
        if let Ok(stripe_webhook_secret) = env::var("STRIPE_WEBHOOK_SECRET") {
            builder = builder.set_override("stripe.webhook_secret", stripe_webhook_secret)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections < 1 {
            return Err("Database max_connections must be at least 1".to_string());
        }
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }
        if self.auth.magic_link_ttl_hours < 1 {
            return Err("auth.magic_link_ttl_hours must be at least 1".to_string());
        }
        if self.auth.magic_link_ttl_hours >= self.auth.session_ttl_days * 24 {
            return Err(
                "auth.magic_link_ttl_hours must be shorter than the session lifetime".to_string(),
            );
        }
        if self.auth.trial_hours < 1 {
            return Err("auth.trial_hours must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:test.db".to_string(),
                max_connections: 5,
            },
            auth: AuthConfig::default(),
            email: EmailConfig::default(),
            stripe: StripeConfig::default(),
            rate_limit: RateLimitConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validation_zero_port() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_connections() {
        let mut config = valid_config();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_link_ttl_must_undercut_session_ttl() {
        let mut config = valid_config();
        config.auth.magic_link_ttl_hours = 7 * 24;
        assert!(config.validate().is_err());
    }
}

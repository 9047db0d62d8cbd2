use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::services::access::DEFAULT_GRACE_MINUTES;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::with_security_headers;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/courts";

pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub allowed_origins: String,
    pub production: bool,
    pub access_grace_minutes: i64,
    pub payment: PaymentConfig,
}

/// Settings for the hosted-checkout payment collaborator.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub api_url: String,
    pub api_key: String,
    pub webhook_url: String,
    pub frontend_base_url: String,
    pub currency: String,
    pub timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5),
            bind_addr: parse_var("BIND_ADDR", default_bind_addr()),
            allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| cors::DEFAULT_ALLOWED_ORIGINS.to_string()),
            production: env::var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
            access_grace_minutes: parse_var("ACCESS_GRACE_MINUTES", DEFAULT_GRACE_MINUTES),
            payment: PaymentConfig::from_env(),
        }
    }
}

impl PaymentConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("PAYMENT_API_URL")
                .unwrap_or_else(|_| "http://localhost:4010".to_string()),
            api_key: env::var("PAYMENT_API_KEY").unwrap_or_default(),
            webhook_url: env::var("PAYMENT_WEBHOOK_URL")
                .unwrap_or_else(|_| "http://localhost:3001/api/v1/payments/callback".to_string()),
            frontend_base_url: env::var("FRONTEND_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "BOB".to_string()),
            timeout_secs: parse_var("PAYMENT_TIMEOUT_SECS", 10),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3001))
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Config: invalid value '{}' for {}, using default", raw, key);
                default
            }
        },
        Err(_) => default,
    }
}

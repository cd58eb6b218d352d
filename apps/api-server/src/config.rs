//! Application configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use stratus_infra::billing::BillingApiConfig;
use stratus_infra::rate_limit::RateLimitConfig;
use stratus_infra::resilience::CircuitBreakerConfig;
use stratus_infra::webhooks::DEFAULT_RETENTION;

#[cfg(feature = "postgres")]
use stratus_infra::database::DatabaseConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    #[cfg(feature = "postgres")]
    pub database: Option<DatabaseConfig>,
    pub admission: AdmissionConfig,
    pub billing: BillingApiConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub webhooks: WebhookConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            #[cfg(feature = "postgres")]
            database: DatabaseConfig::from_env(),
            admission: AdmissionConfig::from_env(),
            billing: BillingApiConfig::from_env(),
            circuit_breaker: CircuitBreakerConfig::from_env(),
            webhooks: WebhookConfig::from_env(),
        }
    }
}

/// Where admission counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Redis,
}

/// Per-class request admission limits.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub backend: RateLimitBackend,
    pub read: RateLimitConfig,
    pub write: RateLimitConfig,
    pub payment: RateLimitConfig,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        let minute = Duration::from_secs(60);
        Self {
            backend: RateLimitBackend::Memory,
            read: RateLimitConfig::new(100, minute),
            write: RateLimitConfig::new(30, minute),
            payment: RateLimitConfig::new(10, minute),
        }
    }
}

impl AdmissionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let backend = match env::var("RATE_LIMIT_BACKEND").as_deref() {
            Ok("redis") => RateLimitBackend::Redis,
            _ => RateLimitBackend::Memory,
        };

        Self {
            backend,
            read: RateLimitConfig::from_env("RATE_LIMIT_READ", defaults.read),
            write: RateLimitConfig::from_env("RATE_LIMIT_WRITE", defaults.write),
            payment: RateLimitConfig::from_env("RATE_LIMIT_PAYMENT", defaults.payment),
        }
    }
}

/// Inbound webhook settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Signing secret shared with the provider. Unsigned deliveries are
    /// accepted only when this is unset.
    pub secret: Option<String>,
    pub signature_tolerance: Duration,
    pub retention: Duration,
    pub cleanup_cron: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            signature_tolerance: Duration::from_secs(300),
            retention: DEFAULT_RETENTION,
            cleanup_cron: "0 0 3 * * *".to_string(),
        }
    }
}

impl WebhookConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secret = env::var("BILLING_WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());
        if secret.is_none() {
            tracing::warn!("BILLING_WEBHOOK_SECRET not set. Webhook signatures will not be verified.");
        }

        Self {
            secret,
            signature_tolerance: env::var("WEBHOOK_SIGNATURE_TOLERANCE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.signature_tolerance),
            retention: env::var("WEBHOOK_RETENTION_DAYS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .and_then(retention_days)
                .unwrap_or(defaults.retention),
            cleanup_cron: env::var("WEBHOOK_CLEANUP_CRON").unwrap_or(defaults.cleanup_cron),
        }
    }
}

/// Longest ledger retention `WEBHOOK_RETENTION_DAYS` may ask for.
const MAX_RETENTION_DAYS: u64 = 36_500;

/// `None` (falling back to the default) for values above the cap.
fn retention_days(days: u64) -> Option<Duration> {
    if days > MAX_RETENTION_DAYS {
        tracing::warn!(days, max = MAX_RETENTION_DAYS, "WEBHOOK_RETENTION_DAYS out of range; using default");
        return None;
    }
    Some(Duration::from_secs(days * 24 * 60 * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_days_are_capped() {
        assert_eq!(retention_days(7), Some(Duration::from_secs(7 * 86_400)));
        assert_eq!(retention_days(MAX_RETENTION_DAYS), Some(Duration::from_secs(MAX_RETENTION_DAYS * 86_400)));
        assert_eq!(retention_days(u64::MAX / 1000), None);
    }
}

//! Application state - shared across all handlers.

use std::sync::Arc;

use stratus_core::ports::{
    BillingEventHandler, Clock, PaymentGateway, RateLimitError, RateLimiter, TokenService,
    WebhookEventStore,
};
use stratus_core::IntegrationError;
use stratus_infra::billing::{BILLING_SERVICE, HttpPaymentGateway, LoggingBillingEventHandler};
use stratus_infra::clock::SystemClock;
use stratus_infra::rate_limit::{InMemoryRateLimiter, RateLimitConfig, SweeperHandle};
use stratus_infra::resilience::CircuitBreakerRegistry;
use stratus_infra::webhooks::{IdempotentWebhookProcessor, InMemoryWebhookEventStore, SignatureVerifier};

#[cfg(feature = "postgres")]
use stratus_infra::database::{DatabaseConnections, PostgresWebhookEventStore};

use crate::config::{AdmissionConfig, AppConfig, RateLimitBackend};
use crate::middleware::rate_limit::{AdmissionLimiters, AdmissionMiddleware, EndpointClass};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Invalid rate limit configuration: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Payment gateway setup failed: {0}")]
    Gateway(#[from] IntegrationError),
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub clock: Arc<dyn Clock>,
    pub admission: AdmissionLimiters,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub payments: Arc<dyn PaymentGateway>,
    pub webhooks: Arc<IdempotentWebhookProcessor>,
    pub billing_events: Arc<dyn BillingEventHandler>,
    /// `None` when no signing secret is configured.
    pub signatures: Option<SignatureVerifier>,
    pub tokens: Option<Arc<dyn TokenService>>,
    #[cfg(feature = "postgres")]
    pub db: Option<Arc<DatabaseConnections>>,
}

impl AppState {
    /// Build the application state with appropriate implementations.
    pub async fn new(config: &AppConfig) -> Result<Self, StateError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let admission = build_admission(&config.admission, clock.clone()).await?;

        let breakers = Arc::new(CircuitBreakerRegistry::new(
            config.circuit_breaker.clone(),
            clock.clone(),
        ));
        let payments: Arc<dyn PaymentGateway> = Arc::new(HttpPaymentGateway::new(
            config.billing.clone(),
            breakers.get(BILLING_SERVICE),
        )?);

        // Initialize the webhook ledger, Postgres if reachable
        #[cfg(feature = "postgres")]
        let (db, store): (Option<Arc<DatabaseConnections>>, Arc<dyn WebhookEventStore>) = {
            if let Some(db_config) = &config.database {
                match DatabaseConnections::init(db_config).await {
                    Ok(connections) => {
                        let conn = Arc::new(connections);
                        let store = Arc::new(PostgresWebhookEventStore::new(conn.main.clone()));
                        (Some(conn), store)
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to connect to database: {}. Using in-memory webhook ledger.",
                            e
                        );
                        (None, Arc::new(InMemoryWebhookEventStore::new()))
                    }
                }
            } else {
                tracing::warn!("DATABASE_URL not set. Webhook ledger is in-memory and per-process.");
                (None, Arc::new(InMemoryWebhookEventStore::new()))
            }
        };

        #[cfg(not(feature = "postgres"))]
        let store: Arc<dyn WebhookEventStore> = {
            tracing::info!("Running without postgres feature - using in-memory webhook ledger");
            Arc::new(InMemoryWebhookEventStore::new())
        };

        let webhooks = Arc::new(IdempotentWebhookProcessor::new(store, clock.clone()));
        let signatures = config
            .webhooks
            .secret
            .as_ref()
            .map(|secret| SignatureVerifier::new(secret.clone(), config.webhooks.signature_tolerance));

        tracing::info!("Application state initialized");

        Ok(Self {
            clock,
            admission,
            breakers,
            payments,
            webhooks,
            billing_events: Arc::new(LoggingBillingEventHandler),
            signatures,
            tokens: token_service(),
            #[cfg(feature = "postgres")]
            db,
        })
    }

    /// Admission middleware for routes of `class`.
    pub fn admit(&self, class: EndpointClass) -> AdmissionMiddleware {
        AdmissionMiddleware::new(class, self.admission.clone(), self.tokens.clone())
    }
}

#[cfg(feature = "auth")]
fn token_service() -> Option<Arc<dyn TokenService>> {
    Some(Arc::new(stratus_infra::auth::JwtTokenService::from_env()))
}

#[cfg(not(feature = "auth"))]
fn token_service() -> Option<Arc<dyn TokenService>> {
    None
}

async fn build_admission(
    config: &AdmissionConfig,
    clock: Arc<dyn Clock>,
) -> Result<AdmissionLimiters, StateError> {
    let mut sweepers = Vec::new();

    let read = build_limiter(EndpointClass::Read, &config.read, config.backend, &clock, &mut sweepers).await?;
    let write = build_limiter(EndpointClass::Write, &config.write, config.backend, &clock, &mut sweepers).await?;
    let payment =
        build_limiter(EndpointClass::Payment, &config.payment, config.backend, &clock, &mut sweepers).await?;

    Ok(AdmissionLimiters::new(read, write, payment, clock).with_sweepers(sweepers))
}

async fn build_limiter(
    class: EndpointClass,
    limits: &RateLimitConfig,
    backend: RateLimitBackend,
    clock: &Arc<dyn Clock>,
    sweepers: &mut Vec<SweeperHandle>,
) -> Result<Arc<dyn RateLimiter>, StateError> {
    let shared = match backend {
        RateLimitBackend::Redis => redis_limiter(class, limits, clock.clone()).await,
        RateLimitBackend::Memory => None,
    };

    let limiter = match shared {
        Some(limiter) => limiter,
        None => {
            let limiter = Arc::new(InMemoryRateLimiter::new(limits.clone(), clock.clone())?);
            sweepers.push(limiter.spawn_sweeper());
            limiter as Arc<dyn RateLimiter>
        }
    };

    tracing::info!(
        class = class.as_str(),
        max_requests = limits.max_requests,
        window_ms = limits.window.as_millis() as u64,
        "Admission limiter ready"
    );
    Ok(limiter)
}

#[cfg(feature = "redis")]
async fn redis_limiter(
    class: EndpointClass,
    limits: &RateLimitConfig,
    clock: Arc<dyn Clock>,
) -> Option<Arc<dyn RateLimiter>> {
    use stratus_infra::rate_limit::{RedisConfig, RedisRateLimitConfig, RedisRateLimiter};

    let config = RedisRateLimitConfig {
        redis: RedisConfig::from_env(),
        max_requests: limits.max_requests,
        window: limits.window,
        key_prefix: format!("ratelimit:{}", class.as_str()),
    };

    match RedisRateLimiter::new(config, clock).await {
        Ok(limiter) => Some(Arc::new(limiter)),
        Err(e) => {
            tracing::error!(
                class = class.as_str(),
                "Failed to connect Redis rate limiter: {}. Using in-memory fallback.",
                e
            );
            None
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn redis_limiter(
    class: EndpointClass,
    _limits: &RateLimitConfig,
    _clock: Arc<dyn Clock>,
) -> Option<Arc<dyn RateLimiter>> {
    tracing::warn!(
        class = class.as_str(),
        "RATE_LIMIT_BACKEND=redis but the redis feature is disabled. Using in-memory limiter."
    );
    None
}

#[cfg(test)]
impl AppState {
    /// In-memory state around `payments`, with generous admission budgets.
    pub fn for_tests(payments: Arc<dyn PaymentGateway>, clock: Arc<dyn Clock>) -> Self {
        use std::time::Duration;
        use stratus_infra::resilience::CircuitBreakerConfig;

        let limiter = || -> Arc<dyn RateLimiter> {
            Arc::new(
                InMemoryRateLimiter::new(RateLimitConfig::new(1_000, Duration::from_secs(60)), clock.clone())
                    .unwrap(),
            )
        };
        let store: Arc<dyn WebhookEventStore> = Arc::new(InMemoryWebhookEventStore::new());

        Self {
            admission: AdmissionLimiters::new(limiter(), limiter(), limiter(), clock.clone()),
            breakers: Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), clock.clone())),
            payments,
            webhooks: Arc::new(IdempotentWebhookProcessor::new(store, clock.clone())),
            billing_events: Arc::new(LoggingBillingEventHandler),
            signatures: None,
            tokens: None,
            #[cfg(feature = "postgres")]
            db: None,
            clock,
        }
    }
}

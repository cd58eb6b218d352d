//! # Stratus Infrastructure
//!
//! Concrete implementations of the ports defined in `stratus-core`: rate
//! limiters, the resilience primitives around outbound calls, the webhook
//! ledger and processor, and the payment provider client.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `postgres` - PostgreSQL webhook ledger via SeaORM
//! - `auth` - JWT caller identity
//! - `redis` - Redis-backed rate limiting shared across replicas

pub mod billing;
pub mod clock;
pub mod rate_limit;
pub mod resilience;
pub mod webhooks;

#[cfg(feature = "postgres")]
pub mod database;

#[cfg(feature = "auth")]
pub mod auth;

// Re-exports - In-Memory
pub use billing::{BillingApiConfig, HttpPaymentGateway, LoggingBillingEventHandler};
pub use clock::{ManualClock, SystemClock};
pub use rate_limit::{InMemoryRateLimiter, RateLimitConfig, SweeperHandle};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, ResilientCaller, RetryPolicy,
    safe_call, with_retry, with_timeout,
};
pub use webhooks::{InMemoryWebhookEventStore, IdempotentWebhookProcessor, SignatureVerifier};

#[cfg(feature = "postgres")]
pub use database::{DatabaseConfig, DatabaseConnections, PostgresWebhookEventStore};

#[cfg(feature = "auth")]
pub use auth::{JwtConfig, JwtTokenService};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use rate_limit::{RedisConfig, RedisRateLimitConfig, RedisRateLimiter};

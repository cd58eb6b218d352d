//! Resilience primitives for outbound integration calls.
//!
//! - **CircuitBreaker**: fail fast while a dependency is unhealthy
//! - **with_retry**: bounded exponential backoff for transient failures
//! - **with_timeout**: per-attempt deadline
//! - **safe_call / ResilientCaller**: the composed call path
//!
//! # Example
//!
//! ```ignore
//! let breaker = registry.get("billing-provider");
//! let caller = ResilientCaller::new("billing-provider", breaker, RetryPolicy::default(), Duration::from_secs(10));
//!
//! let customer = caller.call(|| client.create_customer(&request)).await?;
//! ```

mod circuit_breaker;
mod retry;
mod safe_call;
mod timeout;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerSnapshot,
    CircuitState,
};
pub use retry::{RetryPolicy, Retryable, with_retry, with_retry_if};
pub use safe_call::{ResilientCaller, SafeCallOptions, safe_call};
pub use timeout::with_timeout;

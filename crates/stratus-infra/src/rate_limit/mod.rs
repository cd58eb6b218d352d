//! Rate limiting implementations.

use std::time::Duration;

mod memory;

/// Longest window either limiter accepts.
pub const MAX_WINDOW: Duration = Duration::from_secs(366 * 24 * 60 * 60);

pub use memory::{InMemoryRateLimiter, RateLimitConfig, SweeperHandle};

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConfig, RedisRateLimitConfig, RedisRateLimiter};

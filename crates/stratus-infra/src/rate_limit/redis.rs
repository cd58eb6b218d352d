//! Redis-backed token bucket, shared by every replica.
//!
//! Each identifier is a hash of `tokens` and `last_refill` (epoch millis)
//! updated by one Lua script, so the check is atomic across processes. The
//! semantics match [`super::InMemoryRateLimiter`]: a full refill once a window
//! has elapsed, and a `reset_at` pinned to `last_refill + window`. Idle keys
//! expire after two windows, which replaces the in-process sweep.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use stratus_core::ports::{Clock, RateLimitError, RateLimitResult, RateLimiter};

use super::MAX_WINDOW;

/// KEYS[1] bucket; ARGV max, window_ms, now_ms.
/// Returns `{allowed, tokens_left, last_refill_ms}`.
const TAKE_TOKEN: &str = r#"
local max = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

local state = redis.call('HMGET', KEYS[1], 'tokens', 'last_refill')
local tokens = tonumber(state[1])
local last = tonumber(state[2])

if tokens == nil or last == nil or now - last >= window then
    tokens = max
    last = now
end

local allowed = 0
if tokens > 0 then
    tokens = tokens - 1
    allowed = 1
end

redis.call('HSET', KEYS[1], 'tokens', tokens, 'last_refill', last)
redis.call('PEXPIRE', KEYS[1], window * 2)
return {allowed, tokens, last}
"#;

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub connect_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    /// `REDIS_URL`, `REDIS_CONNECT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout_secs = std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok());

        Self {
            url: std::env::var("REDIS_URL").unwrap_or(defaults.url),
            connect_timeout: timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedisRateLimitConfig {
    pub redis: RedisConfig,
    pub max_requests: u32,
    pub window: Duration,
    /// Namespace for bucket keys, one per endpoint class.
    pub key_prefix: String,
}

impl Default for RedisRateLimitConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            max_requests: 100,
            window: Duration::from_secs(60),
            key_prefix: "ratelimit".to_string(),
        }
    }
}

pub struct RedisRateLimiter {
    conn: ConnectionManager,
    config: RedisRateLimitConfig,
    window_ms: i64,
    clock: Arc<dyn Clock>,
    script: Script,
}

impl RedisRateLimiter {
    /// Connect, failing fast when Redis is unreachable within the
    /// configured timeout.
    pub async fn new(config: RedisRateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self, RateLimitError> {
        let window_ms = i64::try_from(config.window.as_millis()).unwrap_or(i64::MAX);
        if config.max_requests == 0 || window_ms == 0 {
            return Err(RateLimitError::InvalidConfig(
                "max_requests and window must be positive".to_string(),
            ));
        }
        if config.window > MAX_WINDOW {
            return Err(RateLimitError::InvalidConfig(format!(
                "window must not exceed {}s",
                MAX_WINDOW.as_secs()
            )));
        }

        let client = Client::open(config.redis.url.as_str()).map_err(backend)?;
        let conn = tokio::time::timeout(config.redis.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| RateLimitError::Backend(format!("connecting to {} timed out", config.redis.url)))?
            .map_err(backend)?;

        tracing::info!(url = %config.redis.url, prefix = %config.key_prefix, "Redis rate limiter connected");

        Ok(Self {
            conn,
            config,
            window_ms,
            clock,
            script: Script::new(TAKE_TOKEN),
        })
    }

    fn bucket(&self, identifier: &str) -> String {
        format!("{}:{identifier}", self.config.key_prefix)
    }
}

fn backend(e: redis::RedisError) -> RateLimitError {
    RateLimitError::Backend(e.to_string())
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        let mut conn = self.conn.clone();
        let (allowed, tokens, last_refill): (i64, i64, i64) = self
            .script
            .key(self.bucket(key))
            .arg(self.config.max_requests)
            .arg(self.window_ms)
            .arg(self.clock.now().timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        let reset_at = DateTime::<Utc>::from_timestamp_millis(last_refill.saturating_add(self.window_ms))
            .ok_or_else(|| RateLimitError::Backend(format!("bucket {key} has a corrupt refill time")))?;

        Ok(RateLimitResult {
            success: allowed == 1,
            remaining: u32::try_from(tokens.max(0)).unwrap_or(0),
            reset_at,
        })
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(self.bucket(key)).await.map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    /// Connects to `REDIS_URL` (default port 6389); `None` skips the test.
    async fn connect(max_requests: u32, clock: Arc<ManualClock>) -> Option<RedisRateLimiter> {
        let config = RedisRateLimitConfig {
            redis: RedisConfig {
                url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6389".to_string()),
                connect_timeout: Duration::from_secs(1),
            },
            max_requests,
            window: Duration::from_secs(1),
            key_prefix: format!("test:{}", uuid::Uuid::new_v4()),
        };

        RedisRateLimiter::new(config, clock).await.ok()
    }

    #[tokio::test]
    async fn test_budget_refills_after_window() {
        let clock = Arc::new(ManualClock::default());
        let Some(limiter) = connect(2, clock.clone()).await else {
            return;
        };

        let first = limiter.check("user:a").await.unwrap();
        assert!(first.success);
        assert_eq!(first.remaining, 1);

        clock.advance(Duration::from_millis(300));
        let second = limiter.check("user:a").await.unwrap();
        assert_eq!(second.remaining, 0);
        assert_eq!(second.reset_at, first.reset_at);

        let third = limiter.check("user:a").await.unwrap();
        assert!(!third.success);
        assert_eq!(third.reset_at, first.reset_at);

        assert!(limiter.check("user:b").await.unwrap().success);

        clock.advance(Duration::from_millis(700));
        let refilled = limiter.check("user:a").await.unwrap();
        assert!(refilled.success);
        assert_eq!(refilled.remaining, 1);
    }

    #[tokio::test]
    async fn test_reset_restores_full_budget() {
        let clock = Arc::new(ManualClock::default());
        let Some(limiter) = connect(1, clock).await else {
            return;
        };

        assert!(limiter.check("ip:10.0.0.1").await.unwrap().success);
        assert!(!limiter.check("ip:10.0.0.1").await.unwrap().success);

        limiter.reset("ip:10.0.0.1").await.unwrap();
        limiter.reset("ip:never-seen").await.unwrap();
        assert!(limiter.check("ip:10.0.0.1").await.unwrap().success);
    }

    #[tokio::test]
    async fn test_zero_budget_is_rejected() {
        let err = RedisRateLimiter::new(
            RedisRateLimitConfig {
                max_requests: 0,
                ..Default::default()
            },
            Arc::new(ManualClock::default()),
        )
        .await
        .err();

        assert!(matches!(err, Some(RateLimitError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_oversized_window_is_rejected_before_connecting() {
        let err = RedisRateLimiter::new(
            RedisRateLimitConfig {
                window: MAX_WINDOW + Duration::from_secs(1),
                ..Default::default()
            },
            Arc::new(ManualClock::default()),
        )
        .await
        .err();

        assert!(matches!(err, Some(RateLimitError::InvalidConfig(_))));
    }
}

//! In-memory fixed-window rate limiter.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use stratus_core::ports::{Clock, RateLimitError, RateLimitResult, RateLimiter};

use super::MAX_WINDOW;

/// In-memory rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Read `<prefix>_MAX_REQUESTS` and `<prefix>_WINDOW_MS`, falling back to `default`.
    pub fn from_env(prefix: &str, default: RateLimitConfig) -> Self {
        Self {
            max_requests: std::env::var(format!("{prefix}_MAX_REQUESTS"))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_requests),
            window: std::env::var(format!("{prefix}_WINDOW_MS"))
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default.window),
        }
    }

    fn validate(&self) -> Result<TimeDelta, RateLimitError> {
        if self.max_requests == 0 {
            return Err(RateLimitError::InvalidConfig(
                "max_requests must be positive".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(RateLimitError::InvalidConfig(
                "window must be positive".to_string(),
            ));
        }
        if self.window > MAX_WINDOW {
            return Err(RateLimitError::InvalidConfig(format!(
                "window must not exceed {}s",
                MAX_WINDOW.as_secs()
            )));
        }
        TimeDelta::from_std(self.window)
            .map_err(|e| RateLimitError::InvalidConfig(format!("window out of range: {e}")))
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    tokens: u32,
    last_refill: DateTime<Utc>,
}

/// Per-identifier token bucket that refills to full capacity once a whole
/// window has elapsed since the last refill.
///
/// Limits are per-process; use the Redis limiter when several replicas must
/// share a budget.
pub struct InMemoryRateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    config: RateLimitConfig,
    window: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self, RateLimitError> {
        let window = config.validate()?;

        Ok(Self {
            entries: Mutex::new(HashMap::new()),
            config,
            window,
            clock,
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn window_end(&self, start: DateTime<Utc>) -> Result<DateTime<Utc>, RateLimitError> {
        start
            .checked_add_signed(self.window)
            .ok_or_else(|| RateLimitError::Backend(format!("window from {start} is out of range")))
    }

    /// Number of identifiers currently tracked.
    pub async fn tracked(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Evict identifiers idle for more than two windows. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let idle_limit = self.window.checked_mul(2).unwrap_or(TimeDelta::MAX);

        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now - entry.last_refill <= idle_limit);
        let evicted = before - entries.len();

        if evicted > 0 {
            tracing::debug!(evicted, remaining = entries.len(), "Rate limiter sweep");
        }
        evicted
    }

    /// Run `sweep` every window in the background.
    ///
    /// The task stops when the returned handle is dropped or when the
    /// limiter itself is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let limiter: Weak<Self> = Arc::downgrade(self);
        let period = self.config.window;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match limiter.upgrade() {
                    Some(limiter) => {
                        limiter.sweep().await;
                    }
                    None => break,
                }
            }
        });

        SweeperHandle { task }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        let now = self.clock.now();
        let max = self.config.max_requests;
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.get_mut(key) else {
            let reset_at = self.window_end(now)?;
            entries.insert(
                key.to_string(),
                RateLimitEntry {
                    tokens: max - 1,
                    last_refill: now,
                },
            );
            return Ok(RateLimitResult {
                success: true,
                remaining: max - 1,
                reset_at,
            });
        };

        if now - entry.last_refill >= self.window {
            entry.tokens = max;
            entry.last_refill = now;
        }

        let reset_at = self.window_end(entry.last_refill)?;
        if entry.tokens > 0 {
            entry.tokens -= 1;
            Ok(RateLimitResult {
                success: true,
                remaining: entry.tokens,
                reset_at,
            })
        } else {
            Ok(RateLimitResult {
                success: false,
                remaining: 0,
                reset_at,
            })
        }
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Owns the background sweep task; aborts it on drop.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

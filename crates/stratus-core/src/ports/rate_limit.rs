//! Rate limiting port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ErrorCode;

/// Rate limiter trait - abstraction over rate limiting backends.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Consume one token for `key` if one is available.
    async fn check(&self, key: &str) -> Result<RateLimitResult, RateLimitError>;

    /// Forget everything about `key`. Idempotent.
    async fn reset(&self, key: &str) -> Result<(), RateLimitError>;
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub success: bool,
    pub remaining: u32,
    /// End of the current window. Constant for every check within one window.
    pub reset_at: DateTime<Utc>,
}

impl RateLimitResult {
    /// Turn a rejected check into a `RATE_LIMITED` error.
    ///
    /// For limiter callers outside the HTTP admission path, such as jobs or
    /// domain services metering their own work. HTTP admission answers with
    /// its own `TOO_MANY_REQUESTS` problem body and never calls this.
    pub fn ensure_allowed(self) -> Result<Self, RateLimitError> {
        if self.success {
            Ok(self)
        } else {
            Err(RateLimitError::Exceeded {
                reset_at: self.reset_at,
            })
        }
    }

    /// `reset_at` as epoch milliseconds.
    pub fn reset_at_ms(&self) -> i64 {
        self.reset_at.timestamp_millis()
    }
}

/// Rate limit errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded, resets at {reset_at}")]
    Exceeded { reset_at: DateTime<Utc> },

    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl RateLimitError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            RateLimitError::Exceeded { .. } => Some(ErrorCode::RateLimited),
            _ => None,
        }
    }
}

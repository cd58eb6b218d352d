//! The single call path for outbound integration calls.
//!
//! Composition (outside-in): circuit breaker → retry → timeout → operation.
//! The breaker only sees the final, post-retry outcome, so a transient
//! failure that heals within the retry budget never counts against it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use stratus_core::IntegrationError;

use super::circuit_breaker::CircuitBreaker;
use super::retry::{RetryPolicy, with_retry};
use super::timeout::with_timeout;

/// Options for one [`safe_call`].
#[derive(Clone, Copy)]
pub struct SafeCallOptions<'a> {
    pub service_name: &'a str,
    pub circuit_breaker: &'a CircuitBreaker,
    pub retry: &'a RetryPolicy,
    /// Deadline for each individual attempt.
    pub timeout: Duration,
}

/// Call `op` under timeout, retry and circuit breaker.
///
/// Unstructured upstream failures come back as `API_ERROR` attributed to
/// `service_name`; `CIRCUIT_BREAKER_OPEN` and `TIMEOUT` keep their codes.
pub async fn safe_call<F, Fut, T>(op: F, options: SafeCallOptions<'_>) -> Result<T, IntegrationError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, IntegrationError>>,
{
    let SafeCallOptions {
        service_name,
        circuit_breaker,
        retry,
        timeout,
    } = options;
    let timeout_message = format!(
        "{service_name} did not respond within {}ms",
        timeout.as_millis()
    );

    circuit_breaker
        .execute(|| {
            with_retry(retry, || {
                with_timeout(op(), timeout, Some(timeout_message.as_str()))
            })
        })
        .await
        .map_err(|err| {
            let err = err.attribute_to(service_name);
            tracing::warn!(
                service = service_name,
                code = %err.code(),
                error = %err,
                "Integration call failed"
            );
            err
        })
}

/// A service's resilience settings bundled with its shared breaker.
#[derive(Clone)]
pub struct ResilientCaller {
    service_name: String,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ResilientCaller {
    pub fn new(
        service_name: impl Into<String>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            breaker,
            retry,
            timeout,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T, IntegrationError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, IntegrationError>>,
    {
        safe_call(
            op,
            SafeCallOptions {
                service_name: &self.service_name,
                circuit_breaker: &self.breaker,
                retry: &self.retry,
                timeout: self.timeout,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use stratus_core::{ErrorCode, FailureKind, UpstreamError};

    use crate::clock::ManualClock;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};

    fn caller(threshold: u32, max_attempts: u32) -> ResilientCaller {
        let breaker = Arc::new(CircuitBreaker::new(
            "billing-provider",
            CircuitBreakerConfig {
                threshold,
                reset_timeout: Duration::from_secs(30),
                single_probe: true,
            },
            Arc::new(ManualClock::default()),
        ));
        ResilientCaller::new(
            "billing-provider",
            breaker,
            RetryPolicy::new(max_attempts, Duration::from_millis(10), Duration::from_millis(40)),
            Duration::from_millis(500),
        )
    }

    fn refused() -> IntegrationError {
        IntegrationError::Upstream(UpstreamError::new(
            FailureKind::ConnectionRefused,
            "connection refused",
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_healed_transient_failure_does_not_count_against_breaker() {
        let caller = caller(1, 3);
        let attempts = AtomicU32::new(0);

        let value = caller
            .call(|| async {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(refused())
                } else {
                    Ok("cus_123")
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "cus_123");
        assert_eq!(caller.breaker().state(), CircuitState::Closed);
        assert_eq!(caller.breaker().snapshot().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_count_once_and_wrap_as_api_error() {
        let caller = caller(5, 3);
        let attempts = AtomicU32::new(0);

        let err = caller
            .call(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(refused())
            })
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(err.code(), ErrorCode::ApiError);
        assert!(matches!(
            err,
            IntegrationError::Api { ref service, ref source }
                if service == "billing-provider" && source.kind == FailureKind::ConnectionRefused
        ));
        assert_eq!(caller.breaker().snapshot().failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_code_and_is_not_retried() {
        let caller = caller(5, 3);
        let attempts = AtomicU32::new(0);

        let err = caller
            .call(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, IntegrationError>(())
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(err.to_string().contains("billing-provider"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(caller.breaker().snapshot().failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_short_circuits_without_wrapping() {
        let caller = caller(2, 1);
        for _ in 0..2 {
            let _ = caller.call(|| async { Err::<(), _>(refused()) }).await;
        }
        assert_eq!(caller.breaker().state(), CircuitState::Open);

        let attempts = AtomicU32::new(0);
        let err = caller
            .call(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok::<_, IntegrationError>(())
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::CircuitBreakerOpen);
        assert!(matches!(err, IntegrationError::CircuitOpen { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_attempted_once() {
        let caller = caller(5, 4);
        let attempts = AtomicU32::new(0);

        let err = caller
            .call(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(IntegrationError::Upstream(
                    UpstreamError::new(FailureKind::Fatal, "No such price").with_status(400),
                ))
            })
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(err.upstream().and_then(|e| e.status), Some(400));
    }
}

//! Deadline enforcement for outbound calls.

use std::future::Future;
use std::time::Duration;

use stratus_core::IntegrationError;

/// Race `fut` against a `timeout` timer.
///
/// If the timer wins the call fails with `TIMEOUT`, carrying `message` when
/// given. The losing future is dropped, which is the only cancellation an
/// in-flight request gets.
pub async fn with_timeout<F, T>(
    fut: F,
    timeout: Duration,
    message: Option<&str>,
) -> Result<T, IntegrationError>
where
    F: Future<Output = Result<T, IntegrationError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            let message = message.map(str::to_string).unwrap_or_else(|| {
                format!("Operation timed out after {}ms", timeout.as_millis())
            });
            tracing::debug!(timeout_ms = timeout.as_millis() as u64, %message, "Deadline exceeded");
            Err(IntegrationError::Timeout { message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::{ErrorCode, UpstreamError};

    #[tokio::test(start_paused = true)]
    async fn test_returns_result_when_operation_finishes_first() {
        let value = with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, IntegrationError>(7)
            },
            Duration::from_millis(100),
            None,
        )
        .await
        .unwrap();

        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_with_timeout_code_when_timer_fires_first() {
        let err = with_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, IntegrationError>(())
            },
            Duration::from_millis(100),
            Some("Payment provider did not answer"),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::Timeout);
        assert_eq!(err.to_string(), "Payment provider did not answer");
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_message_mentions_deadline() {
        let err = with_timeout(
            std::future::pending::<Result<(), IntegrationError>>(),
            Duration::from_millis(250),
            None,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("250ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_errors_pass_through() {
        let err = with_timeout(
            async {
                Err::<(), _>(IntegrationError::Upstream(UpstreamError::from_message(
                    "ECONNREFUSED",
                )))
            },
            Duration::from_millis(100),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, IntegrationError::Upstream(_)));
    }
}

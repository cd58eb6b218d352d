//! HTTP client for the payment provider.

use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use stratus_core::domain::{CheckoutRequest, CheckoutSession, CreateCustomer, Customer};
use stratus_core::ports::PaymentGateway;
use stratus_core::{FailureKind, IntegrationError, UpstreamError};

use crate::resilience::{CircuitBreaker, ResilientCaller, RetryPolicy};

/// Breaker and log name of the payment provider.
pub const BILLING_SERVICE: &str = "billing-provider";

/// Payment provider connection settings.
#[derive(Debug, Clone)]
pub struct BillingApiConfig {
    pub base_url: String,
    pub api_key: String,
    /// Deadline for each attempt.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for BillingApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:12111".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl BillingApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let ms = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let api_key = std::env::var("BILLING_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("BILLING_API_KEY is not set; provider calls will be rejected");
        }

        Self {
            base_url: std::env::var("BILLING_API_URL").unwrap_or(defaults.base_url),
            api_key,
            timeout: ms("BILLING_TIMEOUT_MS", defaults.timeout),
            retry: RetryPolicy {
                max_attempts: std::env::var("BILLING_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.max_attempts),
                base_delay: ms("BILLING_RETRY_BASE_DELAY_MS", defaults.retry.base_delay),
                max_delay: ms("BILLING_RETRY_MAX_DELAY_MS", defaults.retry.max_delay),
            },
        }
    }
}

/// [`PaymentGateway`] over the provider's JSON API.
///
/// Every call goes through the shared `billing-provider` breaker with retry
/// and a per-attempt deadline. Mutating calls send one `Idempotency-Key`
/// for all attempts of the same logical call.
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    api_key: String,
    caller: ResilientCaller,
}

impl HttpPaymentGateway {
    pub fn new(config: BillingApiConfig, breaker: Arc<CircuitBreaker>) -> Result<Self, IntegrationError> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .user_agent(concat!("stratus/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::new(FailureKind::Fatal, e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            caller: ResilientCaller::new(BILLING_SERVICE, breaker, config.retry, config.timeout),
        })
    }

    async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, IntegrationError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let idempotency_key = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.base_url, path);

        self.caller
            .call(|| self.send(method.clone(), &url, body, &idempotency_key))
            .await
    }

    async fn send<B, T>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        idempotency_key: &str,
    ) -> Result<T, IntegrationError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let mut builder = self
            .client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::new(classify_status(status), provider_message(status, &text))
                .with_status(status.as_u16())
                .into());
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::new(FailureKind::Fatal, format!("invalid provider response: {e}")).into())
    }
}

/// Kind of a non-2xx response. Only an explicit 429 is worth retrying.
pub fn classify_status(status: StatusCode) -> FailureKind {
    if status == StatusCode::TOO_MANY_REQUESTS {
        FailureKind::UpstreamRateLimited
    } else {
        FailureKind::Fatal
    }
}

fn provider_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("provider responded with {status}"))
}

fn transport_error(err: reqwest::Error) -> IntegrationError {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else {
        match FailureKind::from_message(&message) {
            FailureKind::Fatal if err.is_connect() => FailureKind::ConnectionRefused,
            FailureKind::Fatal if err.is_request() => FailureKind::ConnectionReset,
            kind => kind,
        }
    };

    UpstreamError::new(kind, message).into()
}

#[derive(Serialize)]
struct CustomerBody<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    metadata: CustomerMetadata<'a>,
}

#[derive(Serialize)]
struct CustomerMetadata<'a> {
    reference: &'a str,
}

#[derive(Serialize)]
struct CheckoutBody<'a> {
    customer: &'a str,
    mode: &'static str,
    line_items: [LineItem<'a>; 1],
    success_url: &'a str,
    cancel_url: &'a str,
}

#[derive(Serialize)]
struct LineItem<'a> {
    price: &'a str,
    quantity: u32,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_customer(&self, request: &CreateCustomer) -> Result<Customer, IntegrationError> {
        let body = CustomerBody {
            email: &request.email,
            name: request.name.as_deref(),
            metadata: CustomerMetadata {
                reference: &request.reference,
            },
        };
        let customer: Customer = self.request(Method::POST, "/v1/customers", Some(&body)).await?;
        tracing::info!(customer_id = %customer.id, "Billing customer created");
        Ok(customer)
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, IntegrationError> {
        let body = CheckoutBody {
            customer: &request.customer_id,
            mode: "subscription",
            line_items: [LineItem {
                price: &request.price_id,
                quantity: 1,
            }],
            success_url: &request.success_url,
            cancel_url: &request.cancel_url,
        };
        self.request(Method::POST, "/v1/checkout/sessions", Some(&body)).await
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), IntegrationError> {
        let path = format!("/v1/subscriptions/{subscription_id}");
        let _: serde_json::Value = self.request::<(), _>(Method::DELETE, &path, None).await?;
        tracing::info!(subscription_id, "Subscription cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use stratus_core::ErrorCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::clock::ManualClock;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            BILLING_SERVICE,
            CircuitBreakerConfig::default(),
            Arc::new(ManualClock::default()),
        ))
    }

    fn config(base_url: String) -> BillingApiConfig {
        BillingApiConfig {
            base_url,
            api_key: "sk_test".to_string(),
            timeout: Duration::from_secs(2),
            retry: RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(20)),
        }
    }

    /// Serves one canned response per connection and records the
    /// `idempotency-key` header of every request.
    async fn provider(responses: Vec<&'static str>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let keys = Arc::new(Mutex::new(Vec::new()));
        let seen = keys.clone();

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf);
                    if let Some(end) = text.find("\r\n\r\n") {
                        let content_length = text[..end]
                            .lines()
                            .find_map(|l| {
                                l.to_lowercase()
                                    .strip_prefix("content-length:")
                                    .and_then(|v| v.trim().parse::<usize>().ok())
                            })
                            .unwrap_or(0);
                        if buf.len() >= end + 4 + content_length || n == 0 {
                            break;
                        }
                    }
                    if n == 0 {
                        break;
                    }
                }

                let text = String::from_utf8_lossy(&buf).to_lowercase();
                if let Some(key) = text
                    .lines()
                    .find_map(|l| l.strip_prefix("idempotency-key:"))
                {
                    seen.lock().unwrap().push(key.trim().to_string());
                }
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{addr}"), keys)
    }

    const RATE_LIMITED: &str =
        "HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const CREATED: &str = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 42\r\nconnection: close\r\n\r\n{\"id\":\"cus_123\",\"email\":\"ada@example.com\"}";
    const DECLINED: &str = "HTTP/1.1 402 Payment Required\r\ncontent-type: application/json\r\ncontent-length: 41\r\nconnection: close\r\n\r\n{\"error\":{\"message\":\"Card was declined\"}}";

    fn customer() -> CreateCustomer {
        CreateCustomer {
            email: "ada@example.com".to_string(),
            name: Some("Ada".to_string()),
            reference: "user_1".to_string(),
        }
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), FailureKind::UpstreamRateLimited);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), FailureKind::Fatal);
        assert_eq!(classify_status(StatusCode::INTERNAL_SERVER_ERROR), FailureKind::Fatal);
    }

    #[test]
    fn test_provider_message_prefers_error_body() {
        assert_eq!(
            provider_message(StatusCode::PAYMENT_REQUIRED, r#"{"error":{"message":"Card was declined"}}"#),
            "Card was declined"
        );
        assert_eq!(
            provider_message(StatusCode::BAD_GATEWAY, "<html>"),
            "provider responded with 502 Bad Gateway"
        );
    }

    #[tokio::test]
    async fn test_retried_post_reuses_idempotency_key() {
        let (url, keys) = provider(vec![RATE_LIMITED, CREATED]).await;
        let gateway = HttpPaymentGateway::new(config(url), breaker()).unwrap();

        let customer = gateway.create_customer(&customer()).await.unwrap();

        assert_eq!(customer.id, "cus_123");
        let keys = keys.lock().unwrap().clone();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], keys[1]);
    }

    #[tokio::test]
    async fn test_fatal_status_is_not_retried() {
        let (url, keys) = provider(vec![DECLINED, CREATED]).await;
        let breaker = breaker();
        let gateway = HttpPaymentGateway::new(config(url), breaker.clone()).unwrap();

        let err = gateway.create_customer(&customer()).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::ApiError);
        let upstream = err.upstream().unwrap();
        assert_eq!(upstream.status, Some(402));
        assert_eq!(upstream.message, "Card was declined");
        assert_eq!(keys.lock().unwrap().len(), 1);
        assert_eq!(breaker.snapshot().failure_count, 1);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let breaker = breaker();
        let gateway = HttpPaymentGateway::new(config(format!("http://{addr}")), breaker.clone()).unwrap();

        let err = gateway.cancel_subscription("sub_1").await.unwrap_err();

        assert!(err.upstream().unwrap().kind.is_transient());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().failure_count, 1);
    }
}

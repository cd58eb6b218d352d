//! Data Transfer Objects - request/response types for the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to register the authenticated user at the payment provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCustomerRequestDto {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerResponse {
    pub id: String,
    pub email: String,
}

/// Request to start a hosted checkout for the authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequestDto {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Existing provider customer; a new one is created when absent.
    #[serde(default)]
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
    pub customer_id: String,
}

/// Whether a delivered webhook ran its handler or was a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Processed,
    Skipped,
}

/// Acknowledgement returned to the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    pub status: WebhookStatus,
}

impl WebhookAck {
    pub fn new(status: WebhookStatus) -> Self {
        Self {
            received: true,
            status,
        }
    }
}

/// Health of one circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerHealth {
    pub name: String,
    /// `closed`, `open` or `half_open`.
    pub state: String,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub breakers: Vec<BreakerHealth>,
}

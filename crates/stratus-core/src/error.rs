//! Domain-level error types and the machine-readable error taxonomy.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes surfaced to callers so they can choose between
/// "try again shortly" and "something went wrong" messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RateLimited,
    TooManyRequests,
    CircuitBreakerOpen,
    Timeout,
    ApiError,
    WebhookRegistrationFailed,
    WebhookUpdateFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorCode::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ApiError => "API_ERROR",
            ErrorCode::WebhookRegistrationFailed => "WEBHOOK_REGISTRATION_FAILED",
            ErrorCode::WebhookUpdateFailed => "WEBHOOK_UPDATE_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain errors - business logic failures.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Repository-level errors.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Query execution failed: {0}")]
    Query(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

/// Classification of a failed call to an external dependency, assigned at
/// the call site where the failure is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConnectionReset,
    ConnectionRefused,
    DnsFailure,
    /// The transport or the upstream itself reported a timeout.
    Timeout,
    UpstreamRateLimited,
    Fatal,
}

impl FailureKind {
    /// Whether a failure of this kind is safe to retry.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FailureKind::Fatal)
    }

    /// Map a free-form driver message onto a kind.
    ///
    /// Matching is case-insensitive and covers the usual socket error names
    /// as well as their prose spellings. Anything unrecognised is `Fatal`.
    pub fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        let contains_any = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

        if contains_any(&["econnreset", "connection reset", "socket hang up"]) {
            FailureKind::ConnectionReset
        } else if contains_any(&["econnrefused", "connection refused"]) {
            FailureKind::ConnectionRefused
        } else if contains_any(&["enotfound", "eai_again", "dns error", "failed to lookup address"]) {
            FailureKind::DnsFailure
        } else if contains_any(&["etimedout", "timed out", "timeout"]) {
            FailureKind::Timeout
        } else if contains_any(&["rate limit", "rate_limit", "too many requests"]) {
            FailureKind::UpstreamRateLimited
        } else {
            FailureKind::Fatal
        }
    }
}

/// A failure reported by an external dependency.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: FailureKind,
    pub message: String,
    /// HTTP status, when the failure came back as a response.
    pub status: Option<u16>,
}

impl UpstreamError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Build an error whose kind is inferred from the message text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(FailureKind::from_message(&message), message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Errors produced on the outbound integration path.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Circuit breaker is open for {service}, next attempt at {retry_at}")]
    CircuitOpen {
        service: String,
        retry_at: DateTime<Utc>,
    },

    #[error("{message}")]
    Timeout { message: String },

    #[error("{service} request failed: {source}")]
    Api {
        service: String,
        #[source]
        source: UpstreamError,
    },

    /// A raw upstream failure that has not yet been attributed to a service.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl IntegrationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            IntegrationError::CircuitOpen { .. } => ErrorCode::CircuitBreakerOpen,
            IntegrationError::Timeout { .. } => ErrorCode::Timeout,
            IntegrationError::Api { .. } | IntegrationError::Upstream(_) => ErrorCode::ApiError,
        }
    }

    /// The upstream cause, if this error wraps one.
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            IntegrationError::Api { source, .. } => Some(source),
            IntegrationError::Upstream(source) => Some(source),
            _ => None,
        }
    }

    /// Attribute an unstructured failure to `service` as `API_ERROR`.
    ///
    /// Breaker-open, timeout and already-attributed errors pass through
    /// unchanged.
    pub fn attribute_to(self, service: &str) -> Self {
        match self {
            IntegrationError::Upstream(source) => IntegrationError::Api {
                service: service.to_string(),
                source,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(ErrorCode::CircuitBreakerOpen.as_str(), "CIRCUIT_BREAKER_OPEN");
        assert_eq!(ErrorCode::TooManyRequests.to_string(), "TOO_MANY_REQUESTS");
        assert_eq!(
            serde_json::to_string(&ErrorCode::WebhookRegistrationFailed).unwrap(),
            "\"WEBHOOK_REGISTRATION_FAILED\""
        );
    }

    #[test]
    fn test_failure_kind_from_message_is_case_insensitive() {
        assert_eq!(
            FailureKind::from_message("read ECONNRESET"),
            FailureKind::ConnectionReset
        );
        assert_eq!(
            FailureKind::from_message("Connection Refused (os error 111)"),
            FailureKind::ConnectionRefused
        );
        assert_eq!(
            FailureKind::from_message("getaddrinfo ENOTFOUND api.example.com"),
            FailureKind::DnsFailure
        );
        assert_eq!(FailureKind::from_message("ETIMEDOUT"), FailureKind::Timeout);
        assert_eq!(
            FailureKind::from_message("Rate limit exceeded"),
            FailureKind::UpstreamRateLimited
        );
        assert_eq!(
            FailureKind::from_message("card_declined"),
            FailureKind::Fatal
        );
    }

    #[test]
    fn test_only_fatal_is_not_transient() {
        assert!(FailureKind::ConnectionReset.is_transient());
        assert!(FailureKind::UpstreamRateLimited.is_transient());
        assert!(!FailureKind::Fatal.is_transient());
    }

    #[test]
    fn test_attribute_wraps_only_unstructured_errors() {
        let raw = IntegrationError::Upstream(UpstreamError::from_message("boom"));
        let wrapped = raw.attribute_to("billing");
        assert!(matches!(wrapped, IntegrationError::Api { ref service, .. } if service == "billing"));
        assert_eq!(wrapped.code(), ErrorCode::ApiError);

        let timeout = IntegrationError::Timeout {
            message: "slow".to_string(),
        };
        assert!(matches!(
            timeout.attribute_to("billing"),
            IntegrationError::Timeout { .. }
        ));

        let open = IntegrationError::CircuitOpen {
            service: "billing".to_string(),
            retry_at: Utc::now(),
        };
        assert_eq!(open.attribute_to("other").code(), ErrorCode::CircuitBreakerOpen);
    }
}

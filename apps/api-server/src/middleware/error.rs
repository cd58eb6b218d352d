//! Error handling middleware - RFC 7807 compliant responses.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use std::fmt;

use stratus_core::ports::Clock;
use stratus_core::{DomainError, ErrorCode, IntegrationError, RepoError};
use stratus_infra::webhooks::WebhookError;
use stratus_shared::ErrorResponse;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Unauthorized,
    Internal(String),
    /// Outbound call to an external dependency failed. Build with
    /// [`AppError::upstream`].
    Integration {
        source: IntegrationError,
        /// `Retry-After` seconds, set while the dependency's circuit is open.
        retry_after_secs: Option<i64>,
    },
    /// Webhook could not be recorded or handled; the provider should redeliver.
    Webhook(WebhookError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unauthorized => write!(f, "Unauthorized"),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Integration { source, .. } => write!(f, "{}", source),
            AppError::Webhook(err) => write!(f, "{}", err),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) | AppError::Webhook(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Integration { source, .. } => match source.code() {
                ErrorCode::CircuitBreakerOpen => StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error = match self {
            AppError::NotFound(detail) => ErrorResponse::not_found(detail),
            AppError::BadRequest(detail) => ErrorResponse::bad_request(detail),
            AppError::Unauthorized => ErrorResponse::unauthorized(),
            AppError::Internal(detail) => {
                // Log internal errors
                tracing::error!("Internal error: {}", detail);
                ErrorResponse::internal_error()
            }
            AppError::Integration { source, .. } => {
                let title = status.canonical_reason().unwrap_or("Upstream Error");
                ErrorResponse::new(status.as_u16(), title)
                    .with_detail(source.to_string())
                    .with_code(source.code().as_str())
            }
            AppError::Webhook(err) => {
                let problem = ErrorResponse::internal_error().with_detail("Webhook processing failed");
                match err.code() {
                    Some(code) => problem.with_code(code.as_str()),
                    None => problem,
                }
            }
        };

        let mut response = HttpResponse::build(status);
        if let AppError::Integration {
            retry_after_secs: Some(secs),
            ..
        } = self
        {
            response.insert_header(("Retry-After", secs.to_string()));
        }
        response.json(error)
    }
}

impl AppError {
    /// Wrap a failed outbound call, resolving an open circuit's retry time
    /// against `clock`.
    pub fn upstream(source: IntegrationError, clock: &dyn Clock) -> Self {
        let retry_after_secs = match &source {
            IntegrationError::CircuitOpen { retry_at, .. } => {
                let wait_ms = (*retry_at - clock.now()).num_milliseconds().max(0);
                Some(((wait_ms + 999) / 1000).max(1))
            }
            _ => None,
        };
        AppError::Integration {
            source,
            retry_after_secs,
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        AppError::Webhook(err)
    }
}

// Conversion from domain errors
impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity_type, id } => {
                AppError::NotFound(format!("{} with id {} not found", entity_type, id))
            }
            DomainError::Validation(msg) => AppError::BadRequest(msg),
            DomainError::Unauthorized => AppError::Unauthorized,
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => AppError::NotFound("Resource not found".to_string()),
            RepoError::Constraint(msg) => AppError::BadRequest(msg),
            RepoError::Connection(msg) => {
                tracing::error!("Database connection error: {}", msg);
                AppError::Internal("Database error".to_string())
            }
            RepoError::Query(msg) => {
                tracing::error!("Database query error: {}", msg);
                AppError::Internal("Database error".to_string())
            }
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;

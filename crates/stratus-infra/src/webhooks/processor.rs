//! Exactly-once-effect processing of at-least-once delivered webhook events.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use stratus_core::domain::WebhookEvent;
use stratus_core::ports::{Clock, InsertOutcome, WebhookEventStore};
use stratus_core::{DomainError, ErrorCode, RepoError};

/// Default retention for processed ledger rows.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Result of running an event through the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome<T> {
    /// First delivery; the handler ran and the event is marked processed.
    Processed(T),
    /// The id was already registered by an earlier or concurrent delivery.
    Skipped,
}

impl<T> WebhookOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, WebhookOutcome::Skipped)
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Failed to register webhook event {event_id}: {source}")]
    Registration {
        event_id: String,
        #[source]
        source: RepoError,
    },

    #[error("Failed to mark webhook event {event_id} as processed: {source}")]
    Update {
        event_id: String,
        #[source]
        source: RepoError,
    },

    #[error("Handler failed for webhook event {event_id} ({event_type}): {source}")]
    Handler {
        event_id: String,
        event_type: String,
        #[source]
        source: DomainError,
    },
}

impl WebhookError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            WebhookError::Registration { .. } => Some(ErrorCode::WebhookRegistrationFailed),
            WebhookError::Update { .. } => Some(ErrorCode::WebhookUpdateFailed),
            WebhookError::Handler { .. } => None,
        }
    }
}

/// Guards webhook handlers with the dedup ledger.
///
/// ```text
/// unseen → registered → processed
/// unseen → registered (by someone else) → skipped
/// ```
pub struct IdempotentWebhookProcessor {
    store: Arc<dyn WebhookEventStore>,
    clock: Arc<dyn Clock>,
}

impl IdempotentWebhookProcessor {
    pub fn new(store: Arc<dyn WebhookEventStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Run `handler` at most once per `event_id`.
    ///
    /// Registration happens before the handler runs. A failed handler leaves
    /// the row unprocessed and its error is returned; redeliveries of that id
    /// are still skipped.
    pub async fn execute<F, Fut, T>(
        &self,
        event_id: &str,
        event_type: &str,
        handler: F,
    ) -> Result<WebhookOutcome<T>, WebhookError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let event = WebhookEvent::registered(event_id, event_type, self.clock.now());

        match self.store.insert_if_absent(&event).await {
            Ok(InsertOutcome::Inserted) => {}
            Ok(InsertOutcome::AlreadyExists) => {
                tracing::info!(event_id, event_type, "Duplicate webhook delivery skipped");
                return Ok(WebhookOutcome::Skipped);
            }
            Err(source) => {
                tracing::error!(event_id, event_type, error = %source, "Webhook registration failed");
                return Err(WebhookError::Registration {
                    event_id: event_id.to_string(),
                    source,
                });
            }
        }

        let value = handler().await.map_err(|source| {
            tracing::error!(event_id, event_type, error = %source, "Webhook handler failed");
            WebhookError::Handler {
                event_id: event_id.to_string(),
                event_type: event_type.to_string(),
                source,
            }
        })?;

        self.store
            .mark_processed(event_id, self.clock.now())
            .await
            .map_err(|source| {
                tracing::error!(event_id, event_type, error = %source, "Failed to mark webhook processed");
                WebhookError::Update {
                    event_id: event_id.to_string(),
                    source,
                }
            })?;

        tracing::debug!(event_id, event_type, "Webhook processed");
        Ok(WebhookOutcome::Processed(value))
    }

    /// Delete processed events older than `retention`. Unprocessed rows stay.
    /// A retention reaching past the calendar's start purges nothing.
    pub async fn purge_processed(&self, retention: Duration) -> Result<u64, RepoError> {
        let retention = TimeDelta::from_std(retention)
            .map_err(|e| RepoError::Query(format!("invalid retention: {e}")))?;
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let purged = self.store.purge_processed_before(cutoff).await?;
        tracing::info!(purged, %cutoff, "Purged processed webhook events");
        Ok(purged)
    }
}

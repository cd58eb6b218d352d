//! Webhook dedup ledger port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::WebhookEvent;
use crate::error::RepoError;

/// Outcome of a conditional insert into the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with the same id already exists.
    AlreadyExists,
}

/// Durable ledger of provider event ids.
///
/// Implementations must decide `insert_if_absent` with the backend's own
/// conflict detection (unique index, conditional put, ...). An in-process
/// check is not enough once several replicas share the ledger.
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Insert `event` unless its id is already present.
    async fn insert_if_absent(&self, event: &WebhookEvent) -> Result<InsertOutcome, RepoError>;

    /// Flag the event as processed. Returns `RepoError::NotFound` for unknown ids.
    async fn mark_processed(&self, id: &str, at: DateTime<Utc>) -> Result<(), RepoError>;

    async fn find(&self, id: &str) -> Result<Option<WebhookEvent>, RepoError>;

    /// Delete processed events created before `cutoff`. Unprocessed rows are kept.
    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepoError>;
}

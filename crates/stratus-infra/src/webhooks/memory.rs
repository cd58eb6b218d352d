//! In-memory webhook ledger - used as fallback when Postgres is unavailable.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use stratus_core::RepoError;
use stratus_core::domain::WebhookEvent;
use stratus_core::ports::{InsertOutcome, WebhookEventStore};

/// Ledger backed by a HashMap behind an async RwLock.
///
/// The conditional insert is atomic within one process only, and the
/// ledger is lost on restart. Multi-replica deployments need the
/// Postgres store.
pub struct InMemoryWebhookEventStore {
    events: RwLock<HashMap<String, WebhookEvent>>,
}

impl InMemoryWebhookEventStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl Default for InMemoryWebhookEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookEventStore for InMemoryWebhookEventStore {
    async fn insert_if_absent(&self, event: &WebhookEvent) -> Result<InsertOutcome, RepoError> {
        let mut events = self.events.write().await;
        match events.entry(event.id.clone()) {
            Entry::Occupied(_) => Ok(InsertOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(event.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn mark_processed(&self, id: &str, at: DateTime<Utc>) -> Result<(), RepoError> {
        let mut events = self.events.write().await;
        let event = events.get_mut(id).ok_or(RepoError::NotFound)?;
        event.processed = true;
        event.updated_at = at;
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<WebhookEvent>, RepoError> {
        Ok(self.events.read().await.get(id).cloned())
    }

    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepoError> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|_, e| !(e.processed && e.created_at < cutoff));
        Ok((before - events.len()) as u64)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dedup ledger row for one provider event.
///
/// The `id` is the provider's globally unique event id; the store enforces
/// its uniqueness and the first successful insert wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// A freshly registered, not yet processed event.
    pub fn registered(id: impl Into<String>, event_type: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            processed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

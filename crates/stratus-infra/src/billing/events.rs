//! Default handling of verified provider events.

use async_trait::async_trait;

use stratus_core::DomainError;
use stratus_core::domain::BillingEvent;
use stratus_core::ports::BillingEventHandler;

/// Event types that change subscription state and must carry an object.
const SUBSCRIPTION_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "customer.subscription.created",
    "customer.subscription.updated",
    "customer.subscription.deleted",
    "invoice.paid",
    "invoice.payment_failed",
];

/// Records subscription-affecting events in the log and ignores the rest.
///
/// Deployments with local subscription state replace this with a handler
/// that writes it; the idempotency guarantees come from the processor, not
/// from the handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingBillingEventHandler;

#[async_trait]
impl BillingEventHandler for LoggingBillingEventHandler {
    async fn handle(&self, event: &BillingEvent) -> Result<(), DomainError> {
        if !SUBSCRIPTION_EVENTS.contains(&event.event_type.as_str()) {
            tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring billing event");
            return Ok(());
        }

        let object = event
            .data
            .get("object")
            .ok_or_else(|| DomainError::Validation(format!("{} without data.object", event.event_type)))?;

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            object_id = object.get("id").and_then(|v| v.as_str()).unwrap_or("unknown"),
            "Billing event applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, data: serde_json::Value) -> BillingEvent {
        BillingEvent {
            id: "evt_1".to_string(),
            event_type: event_type.to_string(),
            data,
        }
    }

    #[tokio::test]
    async fn test_unknown_events_are_ignored() {
        let handler = LoggingBillingEventHandler;
        assert!(handler.handle(&event("charge.dispute.created", json!(null))).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscription_event_requires_object() {
        let handler = LoggingBillingEventHandler;

        let ok = event("invoice.paid", json!({"object": {"id": "in_1"}}));
        assert!(handler.handle(&ok).await.is_ok());

        let missing = event("invoice.paid", json!({}));
        assert!(matches!(
            handler.handle(&missing).await,
            Err(DomainError::Validation(_))
        ));
    }
}

//! Retention job for the webhook ledger.

use std::sync::Arc;
use std::time::Duration;

use stratus_infra::webhooks::IdempotentWebhookProcessor;
use tokio_cron_scheduler::JobSchedulerError;

use super::Scheduler;

/// Delete processed ledger rows older than `retention`. Failures are logged
/// and retried on the next tick.
pub async fn purge_webhook_ledger(processor: &IdempotentWebhookProcessor, retention: Duration) -> u64 {
    match processor.purge_processed(retention).await {
        Ok(deleted) => {
            tracing::info!(deleted, retention_days = retention.as_secs() / 86_400, "Webhook ledger purged");
            deleted
        }
        Err(e) => {
            tracing::error!(error = %e, "Webhook ledger purge failed");
            0
        }
    }
}

pub async fn schedule_webhook_cleanup(
    scheduler: &Scheduler,
    processor: Arc<IdempotentWebhookProcessor>,
    retention: Duration,
    schedule: &str,
) -> Result<(), JobSchedulerError> {
    scheduler
        .add_cron("webhook-ledger-purge", schedule, move || {
            let processor = processor.clone();
            async move {
                purge_webhook_ledger(&processor, retention).await;
            }
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::DomainError;
    use stratus_core::ports::WebhookEventStore;
    use stratus_infra::clock::ManualClock;
    use stratus_infra::webhooks::InMemoryWebhookEventStore;

    #[tokio::test]
    async fn test_purge_removes_only_old_processed_events() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryWebhookEventStore::new());
        let processor = IdempotentWebhookProcessor::new(store.clone(), clock.clone());

        processor.execute("evt_old", "invoice.paid", || async { Ok(()) }).await.unwrap();
        processor
            .execute("evt_failed", "invoice.paid", || async {
                Err::<(), _>(DomainError::Internal("boom".to_string()))
            })
            .await
            .unwrap_err();

        clock.advance(Duration::from_secs(10 * 86_400));
        processor.execute("evt_new", "invoice.paid", || async { Ok(()) }).await.unwrap();

        let deleted = purge_webhook_ledger(&processor, Duration::from_secs(7 * 86_400)).await;

        assert_eq!(deleted, 1);
        assert!(store.find("evt_old").await.unwrap().is_none());
        assert!(store.find("evt_failed").await.unwrap().is_some());
        assert!(store.find("evt_new").await.unwrap().is_some());
    }
}

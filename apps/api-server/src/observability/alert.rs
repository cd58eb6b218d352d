//! Operator alerting for ERROR-level events.
//!
//! Failed webhook handlers, exhausted retries against the payment provider
//! and ledger write failures are all logged at ERROR with structured fields
//! (`event_id`, `event_type`, `service`). This layer forwards those events to
//! a channel an operator watches, so a stuck event can be replayed by hand.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{Event, Subscriber};
use tracing_subscriber::{Layer, layer::Context};

/// Fields copied to the top of the alert text when present.
const KEY_FIELDS: [&str; 4] = ["event_id", "event_type", "service", "error"];

const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct AlertMessage {
    pub message: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<(String, String)>,
}

impl AlertMessage {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Plain-text rendering shared by every sender.
    pub fn render(&self) -> String {
        let mut text = format!("[{}] {}: {}", self.timestamp.to_rfc3339(), self.target, self.message);
        for key in KEY_FIELDS {
            if let Some(value) = self.field(key) {
                text.push_str(&format!("\n{key}: {value}"));
            }
        }
        text
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Failed to deliver alert: {0}")]
    Delivery(String),
}

/// A destination for alerts.
#[async_trait::async_trait]
pub trait AlertSender: Send + Sync {
    async fn send(&self, alert: AlertMessage) -> Result<(), AlertError>;
}

/// Writes alerts to stderr. Used when no webhook is configured.
pub struct ConsoleAlertSender;

#[async_trait::async_trait]
impl AlertSender for ConsoleAlertSender {
    async fn send(&self, alert: AlertMessage) -> Result<(), AlertError> {
        eprintln!("\nALERT {}\n", alert.render());
        Ok(())
    }
}

/// Posts alerts as `{"text": ...}` to a chat webhook.
pub struct WebhookAlertSender {
    url: String,
    client: reqwest::Client,
}

impl WebhookAlertSender {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl AlertSender for WebhookAlertSender {
    async fn send(&self, alert: AlertMessage) -> Result<(), AlertError> {
        let payload = serde_json::json!({ "text": alert.render() });

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| AlertError::Delivery(e.to_string()))?;

        Ok(())
    }
}

/// Tracing layer that hands ERROR events to an [`AlertSender`] off the
/// logging path. Alerts are dropped when the channel is full.
pub struct AlertLayer {
    sender: mpsc::Sender<AlertMessage>,
}

impl AlertLayer {
    /// Must be called inside a Tokio runtime.
    pub fn new(alert_sender: Arc<dyn AlertSender>) -> Self {
        let (tx, mut rx) = mpsc::channel::<AlertMessage>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                if let Err(e) = alert_sender.send(alert).await {
                    // Not through tracing: an ERROR here would alert again.
                    eprintln!("{}", e);
                }
            }
        });

        Self { sender: tx }
    }

    pub fn console() -> Self {
        Self::new(Arc::new(ConsoleAlertSender))
    }

    pub fn webhook(url: String) -> Self {
        Self::new(Arc::new(WebhookAlertSender::new(url)))
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn push(&mut self, field: &tracing::field::Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.push(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.push(field, value.to_string());
    }
}

impl<S> Layer<S> for AlertLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != tracing::Level::ERROR {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let alert = AlertMessage {
            message: visitor.message,
            target: event.metadata().target().to_string(),
            timestamp: Utc::now(),
            fields: visitor.fields,
        };

        let _ = self.sender.try_send(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_subscriber::layer::SubscriberExt;

    struct Recording(Arc<Mutex<Vec<AlertMessage>>>);

    #[async_trait::async_trait]
    impl AlertSender for Recording {
        async fn send(&self, alert: AlertMessage) -> Result<(), AlertError> {
            self.0.lock().unwrap().push(alert);
            Ok(())
        }
    }

    #[test]
    fn test_render_puts_event_fields_first() {
        let alert = AlertMessage {
            message: "Webhook handler failed".to_string(),
            target: "stratus_infra::webhooks::processor".to_string(),
            timestamp: Utc::now(),
            fields: vec![
                ("error".to_string(), "boom".to_string()),
                ("event_type".to_string(), "invoice.paid".to_string()),
                ("event_id".to_string(), "evt_1".to_string()),
            ],
        };

        let text = alert.render();

        assert!(text.contains("Webhook handler failed"));
        let id = text.find("event_id: evt_1").unwrap();
        let kind = text.find("event_type: invoice.paid").unwrap();
        let error = text.find("error: boom").unwrap();
        assert!(id < kind && kind < error);
    }

    #[tokio::test]
    async fn test_only_error_events_are_forwarded() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let layer = AlertLayer::new(Arc::new(Recording(seen.clone())));
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(event_id = "evt_1", "not an alert");
            tracing::error!(event_id = "evt_2", event_type = "invoice.paid", "Webhook handler failed");
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message, "Webhook handler failed");
        assert_eq!(seen[0].field("event_id"), Some("evt_2"));
    }
}

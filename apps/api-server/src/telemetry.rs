//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::observability::AlertLayer;

const DEFAULT_FILTER: &str = "info,api_server=debug,stratus_infra=debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    pub service_name: String,
    /// ERROR events are forwarded to an operator channel.
    pub alerts: bool,
    /// Chat webhook for alerts; stderr when unset.
    pub alert_webhook_url: Option<String>,
}

impl TelemetryConfig {
    /// `LOG_FORMAT`, `OTEL_SERVICE_NAME`, `ALERTS_ENABLED`, `ALERT_WEBHOOK_URL`.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Self {
            format: var("LOG_FORMAT").map_or(LogFormat::Pretty, |v| LogFormat::parse(&v)),
            service_name: var("OTEL_SERVICE_NAME").unwrap_or_else(|| "stratus-api".to_string()),
            alerts: var("ALERTS_ENABLED").is_none_or(|v| v != "false" && v != "0"),
            alert_webhook_url: var("ALERT_WEBHOOK_URL"),
        }
    }
}

fn fmt_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = tracing_subscriber::fmt::layer();
    match format {
        LogFormat::Json => layer.json().with_current_span(true).boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
    }
}

/// Install the global subscriber. Call once, inside the runtime, since the
/// alert layer spawns its delivery task.
pub fn init_telemetry(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let alerts = config.alerts.then(|| match &config.alert_webhook_url {
        Some(url) => AlertLayer::webhook(url.clone()),
        None => AlertLayer::console(),
    });

    tracing_subscriber::registry()
        .with(fmt_layer(config.format))
        .with(filter)
        .with(alerts)
        .init();

    tracing::info!(
        service = %config.service_name,
        format = ?config.format,
        alerts = config.alerts,
        "Telemetry initialized"
    );
}

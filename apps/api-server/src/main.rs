//! # Stratus API Server
//!
//! Actix-web composition root: wires the admission limiters, the payment
//! provider client and the webhook processor into HTTP routes.

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

mod config;
mod handlers;
mod middleware;
mod observability;
mod state;
mod telemetry;

#[cfg(feature = "scheduler")]
mod background;

use config::AppConfig;
use observability::RequestIdMiddleware;
use state::AppState;
use telemetry::{TelemetryConfig, init_telemetry};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env();

    tracing::info!("Starting Stratus API Server on {}:{}", config.host, config.port);

    let state = AppState::new(&config)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    #[cfg(feature = "scheduler")]
    let mut scheduler = start_scheduler(&config, &state).await;

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        let app = App::new()
            .wrap(RequestIdMiddleware)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(app_state.clone()));

        let app = match &app_state.tokens {
            Some(tokens) => app.app_data(web::Data::new(tokens.clone())),
            None => app,
        };

        app.configure(|cfg| handlers::configure_routes(cfg, &app_state))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await;

    #[cfg(feature = "scheduler")]
    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            tracing::error!(error = %e, "Scheduler shutdown failed");
        }
    }

    server
}

/// Schedule the webhook ledger purge. Scheduler failures are logged and the
/// server starts without it.
#[cfg(feature = "scheduler")]
async fn start_scheduler(config: &AppConfig, state: &AppState) -> Option<background::Scheduler> {
    use background::{Scheduler, SchedulerConfig, schedule_webhook_cleanup};

    let scheduler = match Scheduler::new(SchedulerConfig::from_env()).await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create scheduler");
            return None;
        }
    };

    let scheduled = schedule_webhook_cleanup(
        &scheduler,
        state.webhooks.clone(),
        config.webhooks.retention,
        &config.webhooks.cleanup_cron,
    )
    .await;
    if let Err(e) = scheduled {
        tracing::error!(error = %e, cron = %config.webhooks.cleanup_cron, "Failed to schedule webhook cleanup");
        return None;
    }

    if let Err(e) = scheduler.start().await {
        tracing::error!(error = %e, "Failed to start scheduler");
        return None;
    }

    Some(scheduler)
}

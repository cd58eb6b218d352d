//! Inbound payment provider webhooks.

use actix_web::{HttpRequest, HttpResponse, web};

use stratus_core::domain::BillingEvent;
use stratus_core::ports::Clock;
use stratus_infra::webhooks::{SIGNATURE_HEADER, WebhookOutcome};
use stratus_shared::dto::{WebhookAck, WebhookStatus};

use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /api/webhooks/billing
///
/// Answers 200 for first deliveries and duplicates alike. If the ledger row
/// cannot be claimed, the 5xx makes the provider redeliver and the event is
/// retried. Once the row is claimed, a failing handler or ledger update still
/// answers 5xx, but every redelivery is acked as `skipped`. The ERROR log
/// line carrying `event_id` and `event_type` is then the only record for a
/// manual replay.
pub async fn billing_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    if let Some(verifier) = &state.signatures {
        let header = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::BadRequest(format!("Missing {} header", SIGNATURE_HEADER)))?;

        verifier.verify(&body, header, state.clock.now()).map_err(|e| {
            tracing::warn!(error = %e, "Rejected webhook with bad signature");
            AppError::BadRequest(e.to_string())
        })?;
    }

    let event: BillingEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid event payload: {}", e)))?;
    if event.id.is_empty() || event.event_type.is_empty() {
        return Err(AppError::BadRequest("Event id and type are required".to_string()));
    }

    let handler = state.billing_events.clone();
    let outcome = state
        .webhooks
        .execute(&event.id, &event.event_type, || handler.handle(&event))
        .await?;

    let status = match outcome {
        WebhookOutcome::Processed(()) => WebhookStatus::Processed,
        WebhookOutcome::Skipped => WebhookStatus::Skipped,
    };
    Ok(HttpResponse::Ok().json(WebhookAck::new(status)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use stratus_core::DomainError;
    use stratus_core::ports::BillingEventHandler;
    use stratus_infra::clock::ManualClock;
    use stratus_infra::webhooks::SignatureVerifier;

    use crate::handlers::test_support::StubGateway;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl BillingEventHandler for Counting {
        async fn handle(&self, _event: &BillingEvent) -> Result<(), DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DomainError::Internal("downstream write failed".to_string()));
            }
            Ok(())
        }
    }

    fn payload(id: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": id,
            "type": "invoice.paid",
            "data": { "object": { "id": "in_1" } }
        }))
        .unwrap()
    }

    fn state_with(handler: Arc<Counting>) -> AppState {
        let mut state = AppState::for_tests(Arc::new(StubGateway::default()), Arc::new(ManualClock::default()));
        state.billing_events = handler;
        state
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .route("/webhooks/billing", web::post().to(billing_webhook)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_redelivered_event_is_skipped() {
        let handler = Arc::new(Counting::default());
        let app = app!(state_with(handler.clone()));

        for expected in ["processed", "skipped"] {
            let req = test::TestRequest::post()
                .uri("/webhooks/billing")
                .set_payload(payload("evt_1"))
                .to_request();
            let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(body["received"], true);
            assert_eq!(body["status"], expected);
        }

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn test_handler_failure_answers_500() {
        let handler = Arc::new(Counting {
            fail: true,
            ..Default::default()
        });
        let app = app!(state_with(handler.clone()));

        let req = test::TestRequest::post()
            .uri("/webhooks/billing")
            .set_payload(payload("evt_2"))
            .to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        let redelivery = test::TestRequest::post()
            .uri("/webhooks/billing")
            .set_payload(payload("evt_2"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, redelivery).await;
        assert_eq!(body["status"], "skipped");
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn test_malformed_payload_is_rejected() {
        let app = app!(state_with(Arc::new(Counting::default())));

        let req = test::TestRequest::post()
            .uri("/webhooks/billing")
            .set_payload("not json")
            .to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_signature_is_enforced_when_configured() {
        let handler = Arc::new(Counting::default());
        let mut state = state_with(handler.clone());
        let verifier = SignatureVerifier::new("whsec_test", Duration::from_secs(300));
        let signed = verifier.sign(&payload("evt_3"), state.clock.now().timestamp());
        state.signatures = Some(verifier);
        let app = app!(state);

        let unsigned = test::TestRequest::post()
            .uri("/webhooks/billing")
            .set_payload(payload("evt_3"))
            .to_request();
        assert_eq!(test::call_service(&app, unsigned).await.status(), StatusCode::BAD_REQUEST);

        let forged = test::TestRequest::post()
            .uri("/webhooks/billing")
            .insert_header((SIGNATURE_HEADER, signed.clone()))
            .set_payload(payload("evt_other"))
            .to_request();
        assert_eq!(test::call_service(&app, forged).await.status(), StatusCode::BAD_REQUEST);

        let good = test::TestRequest::post()
            .uri("/webhooks/billing")
            .insert_header((SIGNATURE_HEADER, signed))
            .set_payload(payload("evt_3"))
            .to_request();
        assert_eq!(test::call_service(&app, good).await.status(), StatusCode::OK);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}

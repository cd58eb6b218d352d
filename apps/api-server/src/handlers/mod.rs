//! HTTP handlers and route configuration.

#[cfg(feature = "auth")]
mod billing;
mod health;
mod webhooks;

use actix_web::web;

use crate::middleware::rate_limit::EndpointClass;
use crate::state::AppState;

/// Configure all application routes.
///
/// Each resource is wrapped with the admission limiter of its class. The
/// webhook endpoint has no admission limit.
pub fn configure_routes(cfg: &mut web::ServiceConfig, state: &AppState) {
    let api = web::scope("/api")
        .service(
            web::resource("/health")
                .wrap(state.admit(EndpointClass::Read))
                .route(web::get().to(health::health_check)),
        )
        .service(web::resource("/webhooks/billing").route(web::post().to(webhooks::billing_webhook)));

    #[cfg(feature = "auth")]
    let api = api.service(
        web::scope("/billing")
            .service(
                web::resource("/customers")
                    .wrap(state.admit(EndpointClass::Write))
                    .route(web::post().to(billing::create_customer)),
            )
            .service(
                web::resource("/checkout")
                    .wrap(state.admit(EndpointClass::Payment))
                    .route(web::post().to(billing::create_checkout)),
            )
            .service(
                web::resource("/subscriptions/{id}/cancel")
                    .wrap(state.admit(EndpointClass::Payment))
                    .route(web::post().to(billing::cancel_subscription)),
            ),
    );

    cfg.service(api);
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    use stratus_core::IntegrationError;
    use stratus_core::domain::{CheckoutRequest, CheckoutSession, CreateCustomer, Customer};
    use stratus_core::ports::PaymentGateway;

    /// Payment gateway double that records created customers.
    #[derive(Default)]
    pub struct StubGateway {
        customers: Mutex<Vec<String>>,
        /// When set, every call fails with an open circuit retrying at this time.
        open_until: Option<DateTime<Utc>>,
    }

    impl StubGateway {
        /// Every call fails as if the provider's circuit were open until `retry_at`.
        pub fn open_circuit(retry_at: DateTime<Utc>) -> Self {
            Self {
                open_until: Some(retry_at),
                ..Default::default()
            }
        }

        pub fn customers(&self) -> Vec<String> {
            self.customers.lock().unwrap().clone()
        }

        fn guard(&self) -> Result<(), IntegrationError> {
            match self.open_until {
                Some(retry_at) => Err(IntegrationError::CircuitOpen {
                    service: "billing-provider".to_string(),
                    retry_at,
                }),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_customer(&self, request: &CreateCustomer) -> Result<Customer, IntegrationError> {
            self.guard()?;
            let mut customers = self.customers.lock().unwrap();
            customers.push(request.email.clone());
            Ok(Customer {
                id: format!("cus_{}", customers.len()),
                email: request.email.clone(),
            })
        }

        async fn create_checkout_session(
            &self,
            _request: &CheckoutRequest,
        ) -> Result<CheckoutSession, IntegrationError> {
            self.guard()?;
            Ok(CheckoutSession {
                id: "cs_1".to_string(),
                url: "https://checkout.example.com/cs_1".to_string(),
            })
        }

        async fn cancel_subscription(&self, _subscription_id: &str) -> Result<(), IntegrationError> {
            self.guard()
        }
    }
}

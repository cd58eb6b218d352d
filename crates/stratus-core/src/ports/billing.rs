//! Payment provider ports.

use async_trait::async_trait;

use crate::domain::{BillingEvent, CheckoutRequest, CheckoutSession, CreateCustomer, Customer};
use crate::error::{DomainError, IntegrationError};

/// Outbound calls to the payment provider.
///
/// Implementations route every call through the resilient call path, so
/// callers only ever see `CIRCUIT_BREAKER_OPEN`, `TIMEOUT` or `API_ERROR`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(&self, request: &CreateCustomer) -> Result<Customer, IntegrationError>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, IntegrationError>;

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), IntegrationError>;
}

/// Business logic applied to a verified, first-seen provider event.
#[async_trait]
pub trait BillingEventHandler: Send + Sync {
    async fn handle(&self, event: &BillingEvent) -> Result<(), DomainError>;
}

//! Domain entities - the core business objects.

mod billing;
mod webhook_event;

pub use billing::{BillingEvent, CheckoutRequest, CheckoutSession, CreateCustomer, Customer};
pub use webhook_event::WebhookEvent;

//! Payment provider integration.

mod events;
mod http;

pub use events::LoggingBillingEventHandler;
pub use http::{BILLING_SERVICE, BillingApiConfig, HttpPaymentGateway, classify_status};

//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod auth;
mod billing;
mod clock;
mod rate_limit;
mod webhook_store;

pub use auth::{AuthError, TokenClaims, TokenService};
pub use billing::{BillingEventHandler, PaymentGateway};
pub use clock::Clock;
pub use rate_limit::{RateLimitError, RateLimitResult, RateLimiter};
pub use webhook_store::{InsertOutcome, WebhookEventStore};

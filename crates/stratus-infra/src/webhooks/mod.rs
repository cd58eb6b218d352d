//! Inbound webhook handling: dedup ledger, idempotent processor and
//! signature verification.

mod memory;
mod processor;
mod signature;

pub use memory::InMemoryWebhookEventStore;
pub use processor::{DEFAULT_RETENTION, IdempotentWebhookProcessor, WebhookError, WebhookOutcome};
pub use signature::{SIGNATURE_HEADER, SignatureError, SignatureVerifier};

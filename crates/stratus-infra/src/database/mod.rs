//! Database connection management and the Postgres webhook ledger.

mod connections;
pub mod entity;
mod webhook_store;

pub use connections::{DatabaseConfig, DatabaseConnections};
pub use webhook_store::PostgresWebhookEventStore;

#[cfg(test)]
mod tests;

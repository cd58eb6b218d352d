//! SeaORM entities.

pub mod webhook_event;

//! Background maintenance jobs.

mod cleanup;
mod scheduler;

pub use cleanup::schedule_webhook_cleanup;
pub use scheduler::{Scheduler, SchedulerConfig};

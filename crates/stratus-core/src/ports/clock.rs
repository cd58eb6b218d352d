//! Time source port.

use chrono::{DateTime, Utc};

/// Wall-clock source. Everything that reasons about windows, cooldowns or
/// retention reads time through this trait.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

//! Wall-clock source.
//!
//! Queue and log files are partitioned by the local calendar day and queued
//! entries carry the unix time of the failed attempt, so every component reads
//! time through this trait instead of calling `Local::now()` directly.

use chrono::{DateTime, Local};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The host's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

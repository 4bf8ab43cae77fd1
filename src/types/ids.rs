//! Newtype wrappers for the identifiers that end up in file names.
//!
//! Both types are embedded in paths under the queue directories, so they are
//! constructed only through functions that guarantee a filesystem-safe shape.

use std::fmt;

use chrono::{DateTime, TimeZone};
use uuid::Uuid;

/// A calendar day in `YYYYMMDD` form, used to partition queue and log files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayKey(String);

impl DayKey {
    /// Derives the day key from a timestamp in the timestamp's own time zone.
    pub fn from_datetime<Tz>(at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        DayKey(at.format("%Y%m%d").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one drain invocation, appended to claimed file names.
///
/// The process id alone is not enough: a long-running server drains many
/// times from the same process, and PIDs are reused across restarts. Each
/// claimant therefore carries a random suffix as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClaimantId(String);

impl ClaimantId {
    /// Creates a fresh claimant id for the current process.
    pub fn generate() -> Self {
        ClaimantId(format!(
            "{}-{}",
            std::process::id(),
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

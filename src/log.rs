//! The forward log: a plain-text, day-partitioned record of what each
//! invocation did.
//!
//! This is separate from the process diagnostics emitted through `tracing`.
//! Operators read `<log_dir>/<YYYYMMDD>-forwards.log` to follow queued and
//! replayed events; each line looks like
//!
//! ```text
//! [2024-03-05 10:00:00][pid=4242]Request succeeded, check if a queue file exists.
//! ```
//!
//! Every record is mirrored into `tracing` as well, so a deployment that only
//! collects stderr still sees the same events.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::types::DayKey;

/// Sink for forward-log records.
///
/// `verbose` records are always written. Other records are only written when
/// the current invocation runs with the debug flag.
pub trait EventLog: Send + Sync {
    fn record(&self, message: &str, verbose: bool);
}

/// [`EventLog`] writing to one append-only file per local calendar day.
#[derive(Clone)]
pub struct DailyFileLog {
    dir: PathBuf,
    debug: bool,
    clock: Arc<dyn Clock>,
}

impl DailyFileLog {
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        DailyFileLog {
            dir: dir.into(),
            debug: false,
            clock,
        }
    }

    /// Returns a copy of this log scoped to one invocation's debug flag.
    pub fn with_debug(&self, debug: bool) -> Self {
        DailyFileLog {
            debug,
            ..self.clone()
        }
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for `day`.
    pub fn path_for(&self, day: &DayKey) -> PathBuf {
        self.dir.join(format!("{day}-forwards.log"))
    }

    fn append(&self, now: &DateTime<Local>, message: &str) -> io::Result<PathBuf> {
        let path = self.path_for(&DayKey::from_datetime(now));
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(format_line(now, message).as_bytes())?;
        Ok(path)
    }
}

impl EventLog for DailyFileLog {
    fn record(&self, message: &str, verbose: bool) {
        if verbose {
            info!(target: "push_relay::forward_log", "{message}");
        } else {
            debug!(target: "push_relay::forward_log", "{message}");
            if !self.debug {
                return;
            }
        }

        let now = self.clock.now();
        if let Err(e) = self.append(&now, message) {
            warn!(dir = %self.dir.display(), error = %e, "Failed to write forward log");
        }
    }
}

/// Formats one log line including its terminator.
fn format_line(now: &DateTime<Local>, message: &str) -> String {
    format!(
        "[{}][pid={}]{}\n",
        now.format("%Y-%m-%d %H:%M:%S"),
        std::process::id(),
        message
    )
}

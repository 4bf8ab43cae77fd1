//! Replays queued events after a successful forward.
//!
//! A drain pass claims every queue file it finds, replays its lines one at a
//! time through the forwarder, and flags the claim as exhausted once the end of
//! the file is reached. Replays that fail are re-queued by the forwarder into
//! today's file with their retry count incremented, so they are picked up by a
//! later pass, never by the current one (today's file is created after the
//! listing, or is a different file from the claimed one).

use std::io::{BufRead, BufReader};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::Result;
use super::claim::ProcessingClaim;
use super::entry::QueueEntry;
use super::retention;
use crate::config::HttpVerb;
use crate::forward::{Forwarder, Transport};
use crate::log::EventLog;
use crate::types::ClaimantId;

/// What one drain pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Files this pass renamed into the processing directory.
    pub files_claimed: usize,
    /// Files another claimant got first (or that vanished).
    pub files_skipped: usize,
    /// Claimed files that could not be opened and went back to the queue.
    pub files_restored: usize,
    pub lines_replayed: usize,
    pub lines_delivered: usize,
    /// Replays that failed and were queued again.
    pub lines_requeued: usize,
    /// Lines that were neither blank nor a valid URL.
    pub malformed_lines: usize,
    /// Claimed files abandoned part-way because reading failed.
    pub read_errors: usize,
}

/// Drains the queue through a [`Forwarder`].
pub struct QueueDrainer<'a, T> {
    forwarder: &'a Forwarder<T>,
    verb: HttpVerb,
    pause: Duration,
}

impl<'a, T: Transport> QueueDrainer<'a, T> {
    /// `verb` is used for every replay; `pause` separates consecutive replays.
    pub fn new(forwarder: &'a Forwarder<T>, verb: HttpVerb, pause: Duration) -> Self {
        QueueDrainer {
            forwarder,
            verb,
            pause,
        }
    }

    /// Runs one pass over the queue directory.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Io` only if the queue directory cannot be listed.
    /// Problems with individual files are logged and counted in the report.
    pub async fn drain(&self, log: &dyn EventLog) -> Result<DrainReport> {
        let store = self.forwarder.store();
        let mut report = DrainReport::default();

        let queued = store.list_queued()?;
        if queued.is_empty() {
            log.record("No queue file found.", false);
            return Ok(report);
        }

        let claimant = ClaimantId::generate();
        let mut replays_started = false;

        for path in queued {
            log.record(&format!("Process queue file: {}", path.display()), true);

            let Some(claim) = ProcessingClaim::acquire(store, &path, &claimant) else {
                log.record(
                    &format!("Queue file {} already claimed, skipping.", path.display()),
                    false,
                );
                report.files_skipped += 1;
                continue;
            };
            report.files_claimed += 1;

            let opened = claim.open().map(BufReader::new);
            self.drain_claim(claim, opened, &mut report, &mut replays_started, log)
                .await;
        }

        info!(
            claimed = report.files_claimed,
            replayed = report.lines_replayed,
            delivered = report.lines_delivered,
            requeued = report.lines_requeued,
            "Drain pass finished"
        );
        Ok(report)
    }

    /// Replays one claimed file, or returns it to the queue when `opened`
    /// failed.
    async fn drain_claim<R: BufRead>(
        &self,
        claim: ProcessingClaim,
        opened: std::io::Result<R>,
        report: &mut DrainReport,
        replays_started: &mut bool,
        log: &dyn EventLog,
    ) {
        let store = self.forwarder.store();
        let reader = match opened {
            Ok(reader) => reader,
            Err(e) => {
                log.record(
                    &format!("Cannot open {}: {e}", claim.path().display()),
                    true,
                );
                match claim.restore(store) {
                    Ok(restored) => {
                        log.record(
                            &format!("Returned {} to the queue.", restored.display()),
                            true,
                        );
                        report.files_restored += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to return unreadable claim to the queue");
                        log.record(&format!("Cannot return claim to the queue: {e}"), true);
                    }
                }
                return;
            }
        };

        if self
            .replay_file(&claim, reader, report, replays_started, log)
            .await
        {
            if let Err(e) = retention::mark_exhausted(&claim) {
                warn!(claim = %claim.path().display(), error = %e, "Failed to write exhaustion marker");
            }
            log.record(
                &format!("End of processing of file {}", claim.path().display()),
                false,
            );
        } else {
            report.read_errors += 1;
        }
    }

    /// Replays every line of one claimed file. Returns whether the end of the
    /// file was reached.
    async fn replay_file<R: BufRead>(
        &self,
        claim: &ProcessingClaim,
        mut reader: R,
        report: &mut DrainReport,
        replays_started: &mut bool,
        log: &dyn EventLog,
    ) -> bool {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => return true,
                Ok(_) => {}
                Err(e) => {
                    warn!(claim = %claim.path().display(), error = %e, "Read failed, abandoning claim");
                    log.record(
                        &format!("Cannot read {}: {e}", claim.path().display()),
                        true,
                    );
                    return false;
                }
            }

            let parsed = match std::str::from_utf8(&buf) {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => QueueEntry::parse(text).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            let entry = match parsed {
                Ok(entry) => entry,
                Err(reason) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim();
                    debug!(%reason, "Skipping malformed queue line");
                    log.record(
                        &format!(
                            "Strange line in {}. Not an URL: {line}",
                            claim.path().display()
                        ),
                        true,
                    );
                    report.malformed_lines += 1;
                    continue;
                }
            };

            if *replays_started && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            *replays_started = true;

            log.record(&format!("Retry request: {entry}"), false);
            let request = entry.to_request(self.verb);
            report.lines_replayed += 1;
            if self.forwarder.forward(&request, false, log).await {
                report.lines_delivered += 1;
            } else {
                report.lines_requeued += 1;
            }
        }
    }
}

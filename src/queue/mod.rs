//! Durable retry queue for events that could not be forwarded.
//!
//! Failed attempts are appended as URL lines to one file per day. After a later
//! successful forward, the drain claims whole files and replays them:
//!
//! ```text
//! <data>/forwards/queued/20240305-push-requests.queue              - queued
//! <data>/forwards/processed/20240305-push-requests.process.<id>    - claimed
//! <data>/forwards/processed/20240305-push-requests.process.<id>.done
//!                                                 - marker: every line replayed
//! ```
//!
//! # Mutual exclusion
//!
//! The only coordination between concurrent invocations is `rename(2)` from
//! `queued/` to `processed/`. Exactly one claimant wins the rename for a given
//! file; the others see it vanish and skip it. Both directories must live on
//! the same filesystem for the rename to be atomic.
//!
//! # Lifecycle
//!
//! `absent -> queued -> claimed -> exhausted (retained)`. A claim whose file
//! cannot be opened goes back to `queued`. Retention of exhausted claims and
//! recovery of orphaned ones (from a killed drain) are configured through
//! [`crate::config::RetentionPolicy`]; see [`retention`].

use std::io;

use thiserror::Error;

pub mod claim;
pub mod drain;
pub mod entry;
pub mod retention;
pub mod store;

pub use claim::ProcessingClaim;
pub use drain::{DrainReport, QueueDrainer};
pub use entry::{Bookkeeping, InvalidEntry, QueueEntry};
pub use retention::{MaintenanceReport, prune_exhausted_claims, reclaim_orphaned_claims};
pub use store::{QueueStatus, QueueStore};

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A request could not be turned into a valid queue line.
    #[error("invalid queue entry: {0}")]
    InvalidEntry(#[from] InvalidEntry),
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

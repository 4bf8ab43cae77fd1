//! Exclusive claims on queue files via atomic rename.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use super::Result;
use super::store::{QueueStore, fsync_dir};
use crate::types::ClaimantId;

/// A queue file renamed into the processing directory by one claimant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingClaim {
    queued_path: PathBuf,
    claimed_path: PathBuf,
}

impl ProcessingClaim {
    /// Path a claim on `queued_path` by `claimant` is renamed to:
    /// `<processing_dir>/<queue-file-stem>.process.<claimant>`.
    pub fn claimed_path_for(
        store: &QueueStore,
        queued_path: &Path,
        claimant: &ClaimantId,
    ) -> Option<PathBuf> {
        let stem = queued_path.file_stem()?.to_str()?;
        Some(
            store
                .processing_dir()
                .join(format!("{stem}.process.{claimant}")),
        )
    }

    /// Tries to claim `queued_path`.
    ///
    /// Returns `None` when the rename fails, which is the normal outcome when
    /// another invocation claimed the file first or it vanished. Losing the
    /// race is not an error and is not reported beyond a debug trace.
    pub fn acquire(store: &QueueStore, queued_path: &Path, claimant: &ClaimantId) -> Option<Self> {
        let claimed_path = Self::claimed_path_for(store, queued_path, claimant)?;

        if let Err(e) = fs::create_dir_all(store.processing_dir()) {
            debug!(error = %e, "Processing directory unavailable");
            return None;
        }

        match fs::rename(queued_path, &claimed_path) {
            Ok(()) => {
                // The claim holds even if these fail. The sync only affects
                // whether the rename survives a power loss, and the mtime only
                // feeds orphan detection.
                if let Err(e) = fsync_dir(store.processing_dir()) {
                    debug!(error = %e, "Failed to sync processing directory");
                }
                if let Err(e) = touch(&claimed_path) {
                    debug!(error = %e, "Failed to stamp claim time");
                }
                Some(ProcessingClaim {
                    queued_path: queued_path.to_path_buf(),
                    claimed_path,
                })
            }
            Err(e) => {
                debug!(path = %queued_path.display(), error = %e, "Queue file not claimed");
                None
            }
        }
    }

    /// Path of the queue file before it was claimed.
    pub fn queued_path(&self) -> &Path {
        &self.queued_path
    }

    /// Current path of the claimed file.
    pub fn path(&self) -> &Path {
        &self.claimed_path
    }

    /// Opens the claimed file for reading.
    pub fn open(&self) -> io::Result<File> {
        File::open(&self.claimed_path)
    }

    /// Returns the claimed file to the queue directory, undoing the claim.
    ///
    /// The original name is reused when it is free. If the same day's queue
    /// file was recreated in the meantime, the claim is queued under
    /// `<claim-name>.queue` instead so neither file overwrites the other.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Io` if the file cannot be moved.
    pub fn restore(self, store: &QueueStore) -> Result<PathBuf> {
        let restored = match move_no_clobber(&self.claimed_path, &self.queued_path) {
            Ok(()) => self.queued_path.clone(),
            Err(e) => {
                debug!(error = %e, "Original queue name unavailable, requeueing under claim name");
                let fallback = requeue_path(store, &self.claimed_path)?;
                fs::rename(&self.claimed_path, &fallback)?;
                fallback
            }
        };
        fsync_dir(store.queue_dir())?;
        Ok(restored)
    }
}

/// Queue path used when a claim goes back to the queue under its own name.
pub(crate) fn requeue_path(store: &QueueStore, claimed_path: &Path) -> io::Result<PathBuf> {
    let name = claimed_path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "claim path has no file name")
    })?;
    let mut name = name.to_os_string();
    name.push(".queue");
    Ok(store.queue_dir().join(name))
}

/// Sets the modification time to now, so the claim's age counts from the claim
/// rather than from the last append.
fn touch(path: &Path) -> io::Result<()> {
    OpenOptions::new()
        .append(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

/// Moves `from` to `to`, failing with `AlreadyExists` instead of replacing `to`.
fn move_no_clobber(from: &Path, to: &Path) -> io::Result<()> {
    fs::hard_link(from, to)?;
    fs::remove_file(from)
}

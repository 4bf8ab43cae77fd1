//! Day-partitioned, append-only queue files.
//!
//! # Concurrent appenders
//!
//! Many invocations may fail at the same moment and append to the same day
//! file. Each append opens the file with `O_APPEND` and hands the whole line,
//! terminator included, to a single `write`. On a local POSIX filesystem the
//! kernel positions every such write at the current end of file, so lines from
//! different writers never overlap or truncate each other.
//!
//! # Durability
//!
//! After the write the file is `fdatasync`ed. When the append created the file,
//! the queue directory is fsynced too, otherwise the new directory entry could
//! be lost on power failure even though its contents were synced.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::entry::QueueEntry;
use super::{Result, retention};
use crate::types::DayKey;

/// Suffix of day queue files: `<YYYYMMDD>-push-requests.queue`.
pub const QUEUE_FILE_SUFFIX: &str = "-push-requests.queue";

/// The two directories making up the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStore {
    queue_dir: PathBuf,
    processing_dir: PathBuf,
}

/// Counts describing the queue at one moment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Files waiting in the queue directory.
    pub queued_files: usize,
    /// Non-blank lines across those files.
    pub queued_lines: usize,
    /// Claimed files in the processing directory (any state).
    pub claimed_files: usize,
    /// Claimed files whose lines were all replayed.
    pub exhausted_claims: usize,
}

impl QueueStore {
    pub fn new(queue_dir: impl Into<PathBuf>, processing_dir: impl Into<PathBuf>) -> Self {
        QueueStore {
            queue_dir: queue_dir.into(),
            processing_dir: processing_dir.into(),
        }
    }

    pub fn queue_dir(&self) -> &Path {
        &self.queue_dir
    }

    pub fn processing_dir(&self) -> &Path {
        &self.processing_dir
    }

    /// Creates both directories if needed.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.queue_dir)?;
        fs::create_dir_all(&self.processing_dir)?;
        Ok(())
    }

    /// Path of the queue file for `day`.
    pub fn queue_file_for(&self, day: &DayKey) -> PathBuf {
        self.queue_dir.join(format!("{day}{QUEUE_FILE_SUFFIX}"))
    }

    /// Appends `entry` as one line to the queue file for `day`.
    ///
    /// Creates the queue directory and the file on first use. Returns the path
    /// written to.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Io` if the directory cannot be created or the line
    /// cannot be written and synced.
    pub fn append(&self, day: &DayKey, entry: &QueueEntry) -> Result<PathBuf> {
        fs::create_dir_all(&self.queue_dir)?;

        let path = self.queue_file_for(day);
        let existed = path.exists();

        let mut line = String::with_capacity(entry.as_str().len() + 1);
        line.push_str(entry.as_str());
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        if !existed {
            fsync_dir(&self.queue_dir)?;
        }

        Ok(path)
    }

    /// Lists the files currently waiting in the queue directory, sorted by name.
    ///
    /// A missing directory is an empty queue. Hidden files and subdirectories
    /// are ignored.
    pub fn list_queued(&self) -> Result<Vec<PathBuf>> {
        list_files(&self.queue_dir)
    }

    /// Lists claimed files in the processing directory, excluding markers.
    pub fn list_claims(&self) -> Result<Vec<PathBuf>> {
        Ok(list_files(&self.processing_dir)?
            .into_iter()
            .filter(|path| !retention::is_marker(path))
            .collect())
    }

    /// Counts queued files, queued lines and claims.
    pub fn status(&self) -> Result<QueueStatus> {
        let mut status = QueueStatus::default();

        for path in self.list_queued()? {
            status.queued_files += 1;
            // The file may be claimed between listing and opening.
            match count_lines(&path) {
                Ok(lines) => status.queued_lines += lines,
                Err(e) if e.kind() == io::ErrorKind::NotFound => status.queued_files -= 1,
                Err(e) => return Err(e.into()),
            }
        }

        for claim in self.list_claims()? {
            status.claimed_files += 1;
            if retention::is_exhausted(&claim) {
                status.exhausted_claims += 1;
            }
        }

        Ok(status)
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn count_lines(path: &Path) -> io::Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    for line in reader.split(b'\n') {
        if !line?.trim_ascii().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

/// Syncs a directory so that entries created or renamed in it are durable.
pub(crate) fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

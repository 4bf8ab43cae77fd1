//! Retention of claimed files.
//!
//! Draining never deletes anything: a claim whose lines were all replayed is
//! left in `processed/` and flagged with an empty `<claim>.done` marker. What
//! happens afterwards is an explicit operator choice:
//!
//! - [`prune_exhausted_claims`] deletes exhausted claims (and their markers)
//!   once the marker is older than the configured retention.
//! - [`reclaim_orphaned_claims`] handles claims left behind by a drain that was
//!   killed part-way. A claim without a marker that is older than the
//!   threshold goes back to `queued/` under `<claim-name>.queue` and is
//!   replayed from the start, so events may be delivered twice.
//!
//! With both knobs unset (the default) every claim is kept forever and
//! orphaned claims stay stuck until an operator intervenes.
//!
//! The reclaim threshold must exceed the longest drain you expect. A live
//! claim older than the threshold is indistinguishable from an orphan.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::{info, warn};

use super::Result;
use super::claim::{ProcessingClaim, requeue_path};
use super::store::{QueueStore, fsync_dir};
use crate::config::RetentionPolicy;

const MARKER_EXTENSION: &str = "done";

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub pruned: usize,
    pub reclaimed: usize,
}

/// Path of the exhaustion marker for a claimed file.
pub fn marker_path(claim_path: &Path) -> PathBuf {
    let mut name = claim_path.as_os_str().to_os_string();
    name.push(".");
    name.push(MARKER_EXTENSION);
    PathBuf::from(name)
}

/// Whether `path` is an exhaustion marker rather than a claim.
pub fn is_marker(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == MARKER_EXTENSION)
}

/// Whether every line of the claim at `claim_path` was replayed.
pub fn is_exhausted(claim_path: &Path) -> bool {
    marker_path(claim_path).exists()
}

/// Flags `claim` as fully replayed.
///
/// Idempotent. The directory is synced so the marker survives a crash.
pub fn mark_exhausted(claim: &ProcessingClaim) -> Result<()> {
    let marker = marker_path(claim.path());
    if marker.exists() {
        return Ok(());
    }

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&marker)?;

    if let Some(dir) = marker.parent() {
        fsync_dir(dir)?;
    }
    Ok(())
}

/// Deletes exhausted claims whose marker is older than `older_than`.
///
/// Returns the number of claims removed.
pub fn prune_exhausted_claims(store: &QueueStore, older_than: Duration) -> Result<usize> {
    let cutoff = cutoff(older_than);
    let mut removed = 0;

    for claim in store.list_claims()? {
        let marker = marker_path(&claim);
        if !modified_at_or_before(&marker, cutoff) {
            continue;
        }

        // Claim first: a marker without its claim is ignored by everything.
        remove_if_present(&claim)?;
        remove_if_present(&marker)?;
        removed += 1;
    }

    if removed > 0 {
        fsync_dir(store.processing_dir())?;
    }
    Ok(removed)
}

/// Returns unfinished claims older than `older_than` to the queue.
///
/// Returns the number of claims moved.
pub fn reclaim_orphaned_claims(store: &QueueStore, older_than: Duration) -> Result<usize> {
    let cutoff = cutoff(older_than);
    let mut reclaimed = 0;

    for claim in store.list_claims()? {
        if is_exhausted(&claim) || !modified_at_or_before(&claim, cutoff) {
            continue;
        }

        fs::create_dir_all(store.queue_dir())?;
        let target = requeue_path(store, &claim)?;
        match fs::rename(&claim, &target) {
            Ok(()) => {
                info!(
                    claim = %claim.display(),
                    queued = %target.display(),
                    "Returned orphaned claim to the queue"
                );
                reclaimed += 1;
            }
            // Pruned or reclaimed concurrently by another maintenance pass.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    if reclaimed > 0 {
        fsync_dir(store.queue_dir())?;
    }
    Ok(reclaimed)
}

/// Applies both parts of `policy`; unset parts are skipped.
pub fn apply_policy(store: &QueueStore, policy: RetentionPolicy) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::default();

    if let Some(after) = policy.orphan_reclaim_after {
        report.reclaimed = reclaim_orphaned_claims(store, after)?;
    }
    if let Some(after) = policy.exhausted_claims {
        report.pruned = prune_exhausted_claims(store, after)?;
    }

    Ok(report)
}

fn cutoff(older_than: Duration) -> SystemTime {
    SystemTime::now()
        .checked_sub(older_than)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn modified_at_or_before(path: &Path, cutoff: SystemTime) -> bool {
    match path.metadata().and_then(|m| m.modified()) {
        Ok(modified) => modified <= cutoff,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read modification time");
            false
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClaimantId;
    use std::fs::File;
    use tempfile::tempdir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn setup() -> (tempfile::TempDir, QueueStore) {
        let dir = tempdir().unwrap();
        let store = QueueStore::new(dir.path().join("queued"), dir.path().join("processed"));
        store.ensure_dirs().unwrap();
        (dir, store)
    }

    fn claim(store: &QueueStore, day: &str) -> ProcessingClaim {
        let queued = store.queue_dir().join(format!("{day}-push-requests.queue"));
        fs::write(&queued, "https://api.example.com/push?value=1&retry=1\n").unwrap();
        ProcessingClaim::acquire(store, &queued, &ClaimantId::generate()).unwrap()
    }

    fn age(path: &Path, by: Duration) {
        File::options()
            .append(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - by)
            .unwrap();
    }

    #[test]
    fn marker_naming() {
        assert_eq!(
            marker_path(Path::new("/p/x.process.1-a")),
            Path::new("/p/x.process.1-a.done")
        );
        assert!(is_marker(Path::new("/p/x.process.1-a.done")));
        assert!(!is_marker(Path::new("/p/x.process.1-a")));
    }

    #[test]
    fn mark_exhausted_is_idempotent() {
        let (_dir, store) = setup();
        let claim = claim(&store, "20240305");

        mark_exhausted(&claim).unwrap();
        mark_exhausted(&claim).unwrap();

        assert!(is_exhausted(claim.path()));
        assert!(claim.path().exists());
    }

    #[test]
    fn prune_respects_retention() {
        let (_dir, store) = setup();
        let claim = claim(&store, "20240305");
        mark_exhausted(&claim).unwrap();

        assert_eq!(prune_exhausted_claims(&store, HOUR).unwrap(), 0);
        assert!(claim.path().exists());

        age(&marker_path(claim.path()), 2 * HOUR);
        assert_eq!(prune_exhausted_claims(&store, HOUR).unwrap(), 1);
        assert!(!claim.path().exists());
        assert!(!marker_path(claim.path()).exists());
    }

    #[test]
    fn prune_never_touches_unfinished_claims() {
        let (_dir, store) = setup();
        let claim = claim(&store, "20240305");
        age(claim.path(), 48 * HOUR);

        assert_eq!(prune_exhausted_claims(&store, Duration::ZERO).unwrap(), 0);
        assert!(claim.path().exists());
    }

    #[test]
    fn reclaim_moves_old_orphans_back_to_queue() {
        let (_dir, store) = setup();
        let orphan = claim(&store, "20240305");
        let fresh = claim(&store, "20240306");
        age(orphan.path(), 2 * HOUR);

        assert_eq!(reclaim_orphaned_claims(&store, HOUR).unwrap(), 1);

        assert!(!orphan.path().exists());
        assert!(fresh.path().exists());
        let queued = store.list_queued().unwrap();
        assert_eq!(queued.len(), 1);
        let name = queued[0].file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("20240305-push-requests.process."));
        assert!(name.ends_with(".queue"));
    }

    #[test]
    fn reclaim_skips_exhausted_claims() {
        let (_dir, store) = setup();
        let claim = claim(&store, "20240305");
        mark_exhausted(&claim).unwrap();
        age(claim.path(), 2 * HOUR);

        assert_eq!(reclaim_orphaned_claims(&store, HOUR).unwrap(), 0);
        assert!(claim.path().exists());
    }

    #[test]
    fn fresh_claim_of_an_old_file_is_not_an_orphan() {
        let (_dir, store) = setup();
        let queued = store.queue_dir().join("20240101-push-requests.queue");
        fs::write(&queued, "https://api.example.com/push?value=1&retry=1\n").unwrap();
        age(&queued, 72 * HOUR);

        let claim = ProcessingClaim::acquire(&store, &queued, &ClaimantId::generate()).unwrap();

        assert_eq!(reclaim_orphaned_claims(&store, HOUR).unwrap(), 0);
        assert!(claim.path().exists());
    }

    #[test]
    fn default_policy_keeps_everything() {
        let (_dir, store) = setup();
        let exhausted = claim(&store, "20240305");
        mark_exhausted(&exhausted).unwrap();
        let orphan = claim(&store, "20240306");
        age(&marker_path(exhausted.path()), 1000 * HOUR);
        age(orphan.path(), 1000 * HOUR);

        let report = apply_policy(&store, RetentionPolicy::default()).unwrap();

        assert_eq!(report, MaintenanceReport::default());
        assert!(exhausted.path().exists());
        assert!(orphan.path().exists());
    }

    #[test]
    fn full_policy_prunes_and_reclaims() {
        let (_dir, store) = setup();
        let exhausted = claim(&store, "20240305");
        mark_exhausted(&exhausted).unwrap();
        let orphan = claim(&store, "20240306");
        age(&marker_path(exhausted.path()), 2 * HOUR);
        age(orphan.path(), 2 * HOUR);

        let report = apply_policy(
            &store,
            RetentionPolicy {
                exhausted_claims: Some(HOUR),
                orphan_reclaim_after: Some(HOUR),
            },
        )
        .unwrap();

        assert_eq!(report, MaintenanceReport { pruned: 1, reclaimed: 1 });
        assert!(store.list_claims().unwrap().is_empty());
        assert_eq!(store.list_queued().unwrap().len(), 1);
    }
}

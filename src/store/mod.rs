//! Persistent record of tracked PRs and their change history.
//!
//! Both triggers (webhook deliveries and reconciliation cycles) write through
//! the [`Store`] contract, which is what keeps them from stepping on each
//! other:
//!
//! - `pr_number` is unique; a second `create_tracked` fails with
//!   [`StoreError::DuplicatePr`].
//! - `update_tracked` is a compare-and-swap on [`TrackedPr::version`].
//!   Callers re-read and re-apply on [`StoreError::VersionConflict`], which
//!   [`modify_tracked`] does for them.
//! - `record_change` appends only if the PR is still open and its last
//!   recorded commit differs from the new one, atomically.

mod fsync;
mod memory;
pub mod snapshot;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;

use crate::types::{
    NewPrChange, NewTrackedPr, PrChange, PrNumber, PrStatus, TrackedPr, TrackedPrId,
};

pub use fsync::{fsync_dir, fsync_file, write_atomic};
pub use memory::MemoryStore;
pub use snapshot::{SNAPSHOT_FILE, SnapshotError, StoreSnapshot};

/// Attempts [`modify_tracked`] makes before giving up on a contended row.
pub const MAX_UPDATE_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("tracked PR {0} not found")]
    NotFound(TrackedPrId),

    #[error("PR {0} is already tracked")]
    DuplicatePr(PrNumber),

    #[error("tracked PR {id} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        id: TrackedPrId,
        expected: u64,
        found: u64,
    },

    #[error("failed to persist store: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The background writer could not save the latest changes. They are
    /// still in memory and the writer keeps retrying.
    #[error("store changes not yet persisted: {0}")]
    Unpersisted(Arc<SnapshotError>),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage for tracked PRs and their changes.
///
/// Every method is atomic with respect to every other.
pub trait Store: Send + Sync {
    /// Starts tracking a PR with status `open` and version 0.
    fn create_tracked(&self, new: NewTrackedPr) -> Result<TrackedPr>;

    fn get_tracked(&self, id: TrackedPrId) -> Result<Option<TrackedPr>>;

    fn get_by_number(&self, pr: PrNumber) -> Result<Option<TrackedPr>>;

    /// Writes `pr` if its version still matches the stored one.
    ///
    /// On success the stored row gets `version + 1` and a fresh `updated_at`,
    /// and is returned. `id`, `pr_number` and `created_at` are never changed.
    fn update_tracked(&self, pr: &TrackedPr) -> Result<TrackedPr>;

    /// Tracked PRs ordered by PR number, optionally filtered by status.
    fn list_tracked(&self, status: Option<PrStatus>) -> Result<Vec<TrackedPr>>;

    /// Every tracked PR number, whatever its status.
    fn tracked_numbers(&self) -> Result<BTreeSet<PrNumber>>;

    /// Appends a change unless the PR is no longer open or its last recorded
    /// commit is the same SHA.
    ///
    /// Returns `None` when nothing was appended.
    fn record_change(&self, change: NewPrChange) -> Result<Option<PrChange>>;

    /// A PR's changes, oldest first.
    fn list_changes(&self, id: TrackedPrId) -> Result<Vec<PrChange>>;

    fn last_change(&self, id: TrackedPrId) -> Result<Option<PrChange>>;

    /// Number of tracked PRs per status. Every status is present.
    fn count_by_status(&self) -> Result<BTreeMap<PrStatus, usize>>;
}

/// Re-reads and re-applies `apply` until the write lands.
///
/// `apply` returns `false` to leave the row untouched, in which case
/// `Ok(None)` is returned. It must be safe to call more than once.
pub fn modify_tracked<S, F>(store: &S, id: TrackedPrId, mut apply: F) -> Result<Option<TrackedPr>>
where
    S: Store + ?Sized,
    F: FnMut(&mut TrackedPr) -> bool,
{
    let mut attempt = 0;
    loop {
        let mut pr = store.get_tracked(id)?.ok_or(StoreError::NotFound(id))?;
        if !apply(&mut pr) {
            return Ok(None);
        }
        match store.update_tracked(&pr) {
            Ok(updated) => return Ok(Some(updated)),
            Err(StoreError::VersionConflict { .. }) if attempt + 1 < MAX_UPDATE_ATTEMPTS => {
                attempt += 1;
                tracing::debug!(%id, attempt, "Version conflict, re-reading tracked PR");
            }
            Err(e) => return Err(e),
        }
    }
}

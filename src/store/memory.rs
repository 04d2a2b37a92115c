//! In-memory [`Store`] with optional snapshot persistence.
//!
//! Mutations change the tables in place and bump a generation counter. When
//! the store has a snapshot path, a dedicated writer thread saves the latest
//! generation, so a burst of mutations costs one write and no tokio worker
//! ever waits on the disk. [`MemoryStore::flush`] waits for the writer to
//! catch up.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use super::snapshot::{SnapshotError, StoreSnapshot, save_snapshot_atomic, try_load_snapshot};
use super::{Result, Store, StoreError};
use crate::types::{
    ChangeId, NewPrChange, NewTrackedPr, PrChange, PrNumber, PrStatus, TrackedPr, TrackedPrId,
};

/// Pause before the writer retries a failed snapshot write.
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct Tables {
    /// Bumped by every mutation.
    generation: u64,
    next_tracked_id: u64,
    next_change_id: u64,
    tracked: BTreeMap<TrackedPrId, TrackedPr>,
    by_number: HashMap<PrNumber, TrackedPrId>,
    /// Per-PR changes in creation order.
    changes: HashMap<TrackedPrId, Vec<PrChange>>,
}

impl Tables {
    fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut tables = Tables {
            next_tracked_id: snapshot.next_tracked_id,
            next_change_id: snapshot.next_change_id,
            ..Default::default()
        };
        for pr in snapshot.tracked {
            tables.by_number.insert(pr.pr_number, pr.id);
            tables.tracked.insert(pr.id, pr);
        }
        for change in snapshot.changes {
            tables
                .changes
                .entry(change.tracked_pr_id)
                .or_default()
                .push(change);
        }
        tables
    }

    fn to_snapshot(&self) -> StoreSnapshot {
        let mut changes: Vec<PrChange> = self.changes.values().flatten().cloned().collect();
        changes.sort_by_key(|c| c.id);
        StoreSnapshot {
            next_tracked_id: self.next_tracked_id,
            next_change_id: self.next_change_id,
            tracked: self.tracked.values().cloned().collect(),
            changes,
            ..StoreSnapshot::empty()
        }
    }
}

/// Progress of the snapshot writer.
#[derive(Debug, Default)]
struct WriterState {
    /// Highest generation a write was asked for.
    wanted: u64,
    /// Highest generation known to be on disk.
    written: u64,
    /// Failed writes so far.
    failures: u64,
    last_error: Option<Arc<SnapshotError>>,
    shutdown: bool,
}

#[derive(Debug)]
struct Shared {
    tables: Mutex<Tables>,
    writer: Mutex<WriterState>,
    /// Signalled whenever `writer` changes.
    changed: Condvar,
}

impl Shared {
    fn new(tables: Tables) -> Self {
        Self {
            tables: Mutex::new(tables),
            writer: Mutex::new(WriterState::default()),
            changed: Condvar::new(),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("store mutex poisoned")
    }

    fn writer(&self) -> MutexGuard<'_, WriterState> {
        self.writer.lock().expect("snapshot writer mutex poisoned")
    }

    fn request(&self, generation: u64) {
        let mut state = self.writer();
        state.wanted = state.wanted.max(generation);
        self.changed.notify_all();
    }
}

/// Saves the latest generation until asked to stop with nothing pending.
fn run_writer(shared: &Shared, path: &Path) {
    let mut state = shared.writer();
    loop {
        while state.wanted <= state.written && !state.shutdown {
            state = shared
                .changed
                .wait(state)
                .expect("snapshot writer mutex poisoned");
        }
        if state.wanted <= state.written {
            return;
        }
        drop(state);

        // The snapshot is taken outside the writer lock and written outside
        // the tables lock.
        let (generation, snapshot) = {
            let tables = shared.tables();
            (tables.generation, tables.to_snapshot())
        };
        let result = save_snapshot_atomic(path, &snapshot);

        state = shared.writer();
        match result {
            Ok(()) => {
                debug!(generation, "Wrote store snapshot");
                state.written = state.written.max(generation);
                state.last_error = None;
                shared.changed.notify_all();
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to write store snapshot");
                state.failures += 1;
                state.last_error = Some(Arc::new(e));
                shared.changed.notify_all();
                if state.shutdown {
                    return;
                }
                state = shared
                    .changed
                    .wait_timeout(state, RETRY_DELAY)
                    .expect("snapshot writer mutex poisoned")
                    .0;
            }
        }
    }
}

/// A [`Store`] held in memory behind a mutex.
///
/// With a snapshot path, mutations are visible as soon as they return and
/// reach the disk shortly after. Dropping the store waits for the last write.
#[derive(Debug)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    snapshot_path: Option<PathBuf>,
    writer: Option<JoinHandle<()>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A store that lives only as long as the process.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new(Tables::from_snapshot(StoreSnapshot::empty()))),
            snapshot_path: None,
            writer: None,
        }
    }

    /// Opens the snapshot at `path`, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = match try_load_snapshot(&path)? {
            Some(snapshot) => {
                info!(
                    path = %path.display(),
                    tracked = snapshot.tracked.len(),
                    changes = snapshot.changes.len(),
                    "Loaded store snapshot"
                );
                snapshot
            }
            None => StoreSnapshot::empty(),
        };

        let shared = Arc::new(Shared::new(Tables::from_snapshot(snapshot)));
        let writer = std::thread::Builder::new()
            .name("store-snapshot".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                let path = path.clone();
                move || run_writer(&shared, &path)
            })
            .map_err(SnapshotError::from)?;

        Ok(Self {
            shared,
            snapshot_path: Some(path),
            writer: Some(writer),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Blocks until every mutation made before the call is on disk.
    ///
    /// Fails with the write error if a write attempted meanwhile fails. The
    /// writer keeps retrying regardless.
    pub fn flush(&self) -> Result<()> {
        if self.writer.is_none() {
            return Ok(());
        }
        let generation = self.shared.tables().generation;

        let mut state = self.shared.writer();
        state.wanted = state.wanted.max(generation);
        self.shared.changed.notify_all();
        let failures = state.failures;
        loop {
            if state.written >= generation {
                return Ok(());
            }
            if state.failures > failures
                && let Some(e) = &state.last_error
            {
                return Err(StoreError::Unpersisted(Arc::clone(e)));
            }
            state = self
                .shared
                .changed
                .wait(state)
                .expect("snapshot writer mutex poisoned");
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&*self.shared.tables())
    }

    /// Applies `f` to the tables and schedules a snapshot.
    ///
    /// `f` must not change anything before returning an error.
    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let (out, generation) = {
            let mut tables = self.shared.tables();
            let out = f(&mut *tables)?;
            tables.generation += 1;
            (out, tables.generation)
        };
        if self.writer.is_some() {
            self.shared.request(generation);
        }
        Ok(out)
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        {
            let mut state = self.shared.writer();
            state.shutdown = true;
            self.shared.changed.notify_all();
        }
        if writer.join().is_err() {
            error!("Store snapshot writer panicked");
        }
    }
}

impl Store for MemoryStore {
    fn create_tracked(&self, new: NewTrackedPr) -> Result<TrackedPr> {
        self.write(|t| {
            if t.by_number.contains_key(&new.pr_number) {
                return Err(StoreError::DuplicatePr(new.pr_number));
            }
            let id = TrackedPrId(t.next_tracked_id);
            t.next_tracked_id += 1;
            let now = Utc::now();
            let pr = TrackedPr {
                id,
                pr_number: new.pr_number,
                title: new.title,
                author: new.author,
                url: new.url,
                branch: new.branch,
                description: new.description,
                reviewers: new.reviewers,
                status: PrStatus::Open,
                is_draft: new.is_draft,
                match_reason: new.match_reason,
                match_details: new.match_details,
                opened_at: new.opened_at,
                created_at: now,
                updated_at: now,
                merged_at: None,
                version: 0,
            };
            t.by_number.insert(pr.pr_number, id);
            t.tracked.insert(id, pr.clone());
            Ok(pr)
        })
    }

    fn get_tracked(&self, id: TrackedPrId) -> Result<Option<TrackedPr>> {
        Ok(self.read(|t| t.tracked.get(&id).cloned()))
    }

    fn get_by_number(&self, pr: PrNumber) -> Result<Option<TrackedPr>> {
        Ok(self.read(|t| {
            t.by_number
                .get(&pr)
                .and_then(|id| t.tracked.get(id))
                .cloned()
        }))
    }

    fn update_tracked(&self, pr: &TrackedPr) -> Result<TrackedPr> {
        self.write(|t| {
            let stored = t.tracked.get_mut(&pr.id).ok_or(StoreError::NotFound(pr.id))?;
            if stored.version != pr.version {
                return Err(StoreError::VersionConflict {
                    id: pr.id,
                    expected: pr.version,
                    found: stored.version,
                });
            }
            let updated = TrackedPr {
                id: stored.id,
                pr_number: stored.pr_number,
                created_at: stored.created_at,
                updated_at: Utc::now(),
                version: stored.version + 1,
                ..pr.clone()
            };
            *stored = updated.clone();
            Ok(updated)
        })
    }

    fn list_tracked(&self, status: Option<PrStatus>) -> Result<Vec<TrackedPr>> {
        Ok(self.read(|t| {
            let mut prs: Vec<TrackedPr> = t
                .tracked
                .values()
                .filter(|pr| status.is_none_or(|s| pr.status == s))
                .cloned()
                .collect();
            prs.sort_by_key(|pr| pr.pr_number);
            prs
        }))
    }

    fn tracked_numbers(&self) -> Result<BTreeSet<PrNumber>> {
        Ok(self.read(|t| t.by_number.keys().copied().collect()))
    }

    fn record_change(&self, change: NewPrChange) -> Result<Option<PrChange>> {
        self.write(|t| {
            let pr = t
                .tracked
                .get(&change.tracked_pr_id)
                .ok_or(StoreError::NotFound(change.tracked_pr_id))?;
            if !pr.is_open() {
                return Ok(None);
            }
            let history = t.changes.entry(change.tracked_pr_id).or_default();
            if history
                .last()
                .is_some_and(|last| last.commit_sha == change.commit_sha)
            {
                return Ok(None);
            }
            let recorded = PrChange {
                id: ChangeId(t.next_change_id),
                tracked_pr_id: change.tracked_pr_id,
                commit_sha: change.commit_sha,
                summary: change.summary,
                files_changed: change.files_changed,
                diff_stats: change.diff_stats,
                created_at: Utc::now(),
                notified_at: change.notified_at,
            };
            t.next_change_id += 1;
            history.push(recorded.clone());
            Ok(Some(recorded))
        })
    }

    fn list_changes(&self, id: TrackedPrId) -> Result<Vec<PrChange>> {
        Ok(self.read(|t| t.changes.get(&id).cloned().unwrap_or_default()))
    }

    fn last_change(&self, id: TrackedPrId) -> Result<Option<PrChange>> {
        Ok(self.read(|t| t.changes.get(&id).and_then(|c| c.last()).cloned()))
    }

    fn count_by_status(&self) -> Result<BTreeMap<PrStatus, usize>> {
        Ok(self.read(|t| {
            let mut counts: BTreeMap<PrStatus, usize> =
                PrStatus::ALL.into_iter().map(|s| (s, 0)).collect();
            for pr in t.tracked.values() {
                *counts.entry(pr.status).or_default() += 1;
            }
            counts
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::modify_tracked;
    use crate::test_utils::new_tracked;
    use crate::types::Sha;
    use crate::store::snapshot::load_snapshot;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn change(id: TrackedPrId, sha: &str) -> NewPrChange {
        NewPrChange {
            tracked_pr_id: id,
            commit_sha: Sha::new(sha),
            summary: "s".into(),
            files_changed: vec!["a.rs".into()],
            diff_stats: "1 files, +1 -0".into(),
            notified_at: None,
        }
    }

    #[test]
    fn create_assigns_ids_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let a = store.create_tracked(new_tracked(10)).unwrap();
        let b = store.create_tracked(new_tracked(11)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, PrStatus::Open);
        assert_eq!(a.version, 0);

        let err = store.create_tracked(new_tracked(10)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePr(PrNumber(10))));
        assert_eq!(store.list_tracked(None).unwrap().len(), 2);
    }

    #[test]
    fn update_is_compare_and_swap() {
        let store = MemoryStore::new();
        let pr = store.create_tracked(new_tracked(1)).unwrap();

        let mut first = pr.clone();
        first.title = "first".into();
        let updated = store.update_tracked(&first).unwrap();
        assert_eq!(updated.version, 1);

        let mut stale = pr.clone();
        stale.title = "stale".into();
        let err = store.update_tracked(&stale).unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                found: 1,
                ..
            }
        ));
        assert_eq!(store.get_tracked(pr.id).unwrap().unwrap().title, "first");
    }

    #[test]
    fn update_cannot_change_identity() {
        let store = MemoryStore::new();
        let pr = store.create_tracked(new_tracked(1)).unwrap();
        let mut edited = pr.clone();
        edited.pr_number = PrNumber(99);
        let updated = store.update_tracked(&edited).unwrap();
        assert_eq!(updated.pr_number, PrNumber(1));
        assert!(store.get_by_number(PrNumber(99)).unwrap().is_none());
    }

    #[test]
    fn record_change_skips_repeated_head() {
        let store = MemoryStore::new();
        let pr = store.create_tracked(new_tracked(1)).unwrap();

        assert!(store.record_change(change(pr.id, "aaa")).unwrap().is_some());
        assert!(store.record_change(change(pr.id, "aaa")).unwrap().is_none());
        assert!(store.record_change(change(pr.id, "bbb")).unwrap().is_some());
        // Going back to an earlier head is a new change.
        assert!(store.record_change(change(pr.id, "aaa")).unwrap().is_some());

        let shas: Vec<_> = store
            .list_changes(pr.id)
            .unwrap()
            .into_iter()
            .map(|c| c.commit_sha.0)
            .collect();
        assert_eq!(shas, vec!["aaa", "bbb", "aaa"]);
        assert_eq!(
            store.last_change(pr.id).unwrap().unwrap().commit_sha,
            Sha::new("aaa")
        );
    }

    #[test]
    fn record_change_needs_an_open_pr() {
        let store = MemoryStore::new();
        let pr = store.create_tracked(new_tracked(1)).unwrap();
        modify_tracked(&store, pr.id, |p| {
            p.status = PrStatus::Dismissed;
            true
        })
        .unwrap();

        assert!(store.record_change(change(pr.id, "aaa")).unwrap().is_none());
        assert!(store.list_changes(pr.id).unwrap().is_empty());
    }

    #[test]
    fn record_change_for_unknown_pr_fails() {
        let store = MemoryStore::new();
        let err = store.record_change(change(TrackedPrId(42), "aaa")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(TrackedPrId(42))));
    }

    #[test]
    fn concurrent_record_change_appends_once() {
        let store = Arc::new(MemoryStore::new());
        let pr = store.create_tracked(new_tracked(1)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.record_change(change(pr.id, "same")).unwrap())
            })
            .collect();
        let appended = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .count();

        assert_eq!(appended, 1);
        assert_eq!(store.list_changes(pr.id).unwrap().len(), 1);
    }

    #[test]
    fn modify_tracked_survives_contention() {
        let store = Arc::new(MemoryStore::new());
        let pr = store.create_tracked(new_tracked(1)).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    modify_tracked(store.as_ref(), pr.id, |p| {
                        p.merge_reviewers([format!("reviewer-{i}")])
                    })
                    .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let reviewers = store.get_tracked(pr.id).unwrap().unwrap().reviewers;
        assert_eq!(reviewers.len(), 4);
    }

    #[test]
    fn modify_tracked_can_decline() {
        let store = MemoryStore::new();
        let pr = store.create_tracked(new_tracked(1)).unwrap();
        assert!(modify_tracked(&store, pr.id, |_| false).unwrap().is_none());
        assert_eq!(store.get_tracked(pr.id).unwrap().unwrap().version, 0);
    }

    #[test]
    fn count_by_status_includes_every_status() {
        let store = MemoryStore::new();
        let pr = store.create_tracked(new_tracked(1)).unwrap();
        store.create_tracked(new_tracked(2)).unwrap();
        modify_tracked(&store, pr.id, |p| {
            p.status = PrStatus::Merged;
            true
        })
        .unwrap();

        let counts = store.count_by_status().unwrap();
        assert_eq!(counts[&PrStatus::Open], 1);
        assert_eq!(counts[&PrStatus::Merged], 1);
        assert_eq!(counts[&PrStatus::Closed], 0);
        assert_eq!(counts[&PrStatus::Dismissed], 0);
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let id = {
            let store = MemoryStore::open(&path).unwrap();
            let pr = store.create_tracked(new_tracked(5)).unwrap();
            store.record_change(change(pr.id, "abc")).unwrap();
            pr.id
        };

        let reopened = MemoryStore::open(&path).unwrap();
        let pr = reopened.get_by_number(PrNumber(5)).unwrap().unwrap();
        assert_eq!(pr.id, id);
        assert_eq!(reopened.list_changes(id).unwrap().len(), 1);

        // Ids keep counting from where they left off.
        let next = reopened.create_tracked(new_tracked(6)).unwrap();
        assert!(next.id > id);
    }

    #[test]
    fn flush_writes_the_latest_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = MemoryStore::open(&path).unwrap();
        for n in 1..=20 {
            store.create_tracked(new_tracked(n)).unwrap();
        }
        store.flush().unwrap();

        let on_disk = load_snapshot(&path).unwrap();
        assert_eq!(on_disk.tracked.len(), 20);
        assert_eq!(on_disk.next_tracked_id, 21);
    }

    #[test]
    fn in_memory_store_flushes_trivially() {
        let store = MemoryStore::new();
        store.create_tracked(new_tracked(1)).unwrap();
        store.flush().unwrap();
        assert!(store.snapshot_path().is_none());
    }

    #[test]
    fn failed_write_is_reported_and_retried() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = MemoryStore::open(&path).unwrap();
        // A non-empty directory where the snapshot file should be makes the
        // rename fail.
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let pr = store.create_tracked(new_tracked(1)).unwrap();
        assert!(matches!(store.flush(), Err(StoreError::Unpersisted(_))));
        assert!(store.get_tracked(pr.id).unwrap().is_some());

        std::fs::remove_dir_all(&path).unwrap();
        store.flush().unwrap();
        assert_eq!(load_snapshot(&path).unwrap().tracked.len(), 1);
    }

    proptest! {
        #[test]
        fn list_tracked_is_sorted_and_filtered(numbers in prop::collection::btree_set(1u64..500, 0..20)) {
            let store = MemoryStore::new();
            for n in numbers.iter().rev() {
                store.create_tracked(new_tracked(*n)).unwrap();
            }
            let listed: Vec<u64> = store.list_tracked(Some(PrStatus::Open)).unwrap().iter().map(|p| p.pr_number.0).collect();
            prop_assert_eq!(listed, numbers.iter().copied().collect::<Vec<_>>());
            prop_assert!(store.list_tracked(Some(PrStatus::Closed)).unwrap().is_empty());
        }
    }
}

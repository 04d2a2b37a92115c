//! On-disk snapshot of the store.
//!
//! The whole store is one JSON document, rewritten atomically by the store's
//! writer thread after mutations. Tracked PRs number in the tens, so this
//! stays cheap.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fsync::write_atomic;
use crate::types::{PrChange, TrackedPr};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

pub const SNAPSHOT_FILE: &str = "store.json";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub schema_version: u32,

    pub snapshot_at: DateTime<Utc>,

    /// Next id to hand out for a tracked PR.
    pub next_tracked_id: u64,

    /// Next id to hand out for a change.
    pub next_change_id: u64,

    /// Tracked PRs ordered by id.
    pub tracked: Vec<TrackedPr>,

    /// Changes in creation order.
    pub changes: Vec<PrChange>,
}

impl StoreSnapshot {
    pub fn empty() -> Self {
        StoreSnapshot {
            schema_version: SCHEMA_VERSION,
            snapshot_at: Utc::now(),
            next_tracked_id: 1,
            next_change_id: 1,
            tracked: Vec::new(),
            changes: Vec::new(),
        }
    }
}

pub fn save_snapshot_atomic(path: &Path, snapshot: &StoreSnapshot) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    write_atomic(path, &bytes)?;
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<StoreSnapshot> {
    let bytes = std::fs::read(path)?;
    let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;

    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(SnapshotError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: snapshot.schema_version,
        });
    }

    Ok(snapshot)
}

/// Like [`load_snapshot`], but a missing file is `Ok(None)`.
pub fn try_load_snapshot(path: &Path) -> Result<Option<StoreSnapshot>> {
    match load_snapshot(path) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(SnapshotError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

//! Pull request views as reported by the source host.
//!
//! These are read-only snapshots of GitHub's state. What we persist about a PR
//! lives in [`super::tracked`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PrNumber, Sha};

/// The state of a pull request on GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PrState {
    Open,

    /// Closed with its changes merged. GitHub does not always report the time.
    Merged { merged_at: Option<DateTime<Utc>> },

    /// Closed without merging.
    Closed,
}

impl PrState {
    /// Builds the state from GitHub's `state` string and `merged` flag.
    pub fn from_github(state: &str, merged: bool, merged_at: Option<DateTime<Utc>>) -> Self {
        match (state, merged) {
            ("open", _) => PrState::Open,
            (_, true) => PrState::Merged { merged_at },
            _ => PrState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, PrState::Open)
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, PrState::Merged { .. })
    }

    pub fn merged_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PrState::Merged { merged_at } => *merged_at,
            _ => None,
        }
    }
}

/// An entry from the open-PR listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPr {
    pub number: PrNumber,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub url: String,
    /// Name of the head branch.
    pub branch: String,
    pub head_sha: Sha,
    pub created_at: DateTime<Utc>,
    pub is_draft: bool,
    pub requested_reviewers: Vec<String>,
}

/// Authoritative state of a single PR, fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrSnapshot {
    pub number: PrNumber,
    pub state: PrState,
    pub head_sha: Sha,
    pub title: String,
    pub is_draft: bool,
    pub requested_reviewers: Vec<String>,
}

/// Aggregate diff statistics for a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrDetails {
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
}

/// One file in a PR's diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    /// GitHub's file status: added, modified, removed, renamed, ...
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    pub patch: Option<String>,
}

impl ChangedFile {
    /// Lines touched, used to rank files in summaries.
    pub fn churn(&self) -> u64 {
        self.additions + self.deletions
    }
}

//! Wire shapes of GitHub's pull request JSON.
//!
//! The REST API and the `pull_request` webhook share the same pull request
//! object, so both the API client and the webhook parser deserialize into
//! these and convert to domain types here.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::{ChangedFile, OpenPr, PrDetails, PrNumber, PrSnapshot, PrState, Sha};

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawUser {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawHead {
    #[serde(rename = "ref")]
    pub ref_field: String,
    pub sha: String,
}

/// A pull request object. Fields absent from some endpoints are optional.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawPull {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub body: Option<String>,
    pub user: Option<RawUser>,
    pub html_url: String,
    pub head: RawHead,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub state: String,
    pub draft: Option<bool>,
    pub merged: Option<bool>,
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub requested_reviewers: Vec<RawUser>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub changed_files: Option<u64>,
}

impl RawPull {
    fn reviewers(&self) -> Vec<String> {
        self.requested_reviewers
            .iter()
            .map(|u| u.login.clone())
            .collect()
    }

    pub fn to_open_pr(&self) -> OpenPr {
        OpenPr {
            number: PrNumber(self.number),
            title: self.title.clone(),
            body: self.body.clone(),
            author: self
                .user
                .as_ref()
                .map(|u| u.login.clone())
                .unwrap_or_default(),
            url: self.html_url.clone(),
            branch: self.head.ref_field.clone(),
            head_sha: Sha::new(&self.head.sha),
            created_at: self.created_at,
            is_draft: self.draft.unwrap_or(false),
            requested_reviewers: self.reviewers(),
        }
    }

    pub fn to_snapshot(&self) -> PrSnapshot {
        // `merged` is only present on single-PR responses; fall back to merged_at.
        let merged = self.merged.unwrap_or(self.merged_at.is_some());
        PrSnapshot {
            number: PrNumber(self.number),
            state: PrState::from_github(&self.state, merged, self.merged_at),
            head_sha: Sha::new(&self.head.sha),
            title: self.title.clone(),
            is_draft: self.draft.unwrap_or(false),
            requested_reviewers: self.reviewers(),
        }
    }

    pub fn to_details(&self) -> PrDetails {
        PrDetails {
            additions: self.additions.unwrap_or(0),
            deletions: self.deletions.unwrap_or(0),
            changed_files: self.changed_files.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawFile {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    pub patch: Option<String>,
}

impl From<RawFile> for ChangedFile {
    fn from(raw: RawFile) -> Self {
        ChangedFile {
            filename: raw.filename,
            status: raw.status,
            additions: raw.additions,
            deletions: raw.deletions,
            patch: raw.patch,
        }
    }
}

/// Response of the contents API for a single file.
#[derive(Debug, Deserialize)]
pub(crate) struct RawContent {
    pub content: Option<String>,
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawComparison {
    #[serde(default)]
    pub files: Vec<RawFile>,
}

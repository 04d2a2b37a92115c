//! Entities persisted by the store: tracked pull requests and their change log.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ChangeId, PrNumber, Sha, TrackedPrId};

/// Lifecycle status of a tracked PR.
///
/// `Merged`, `Closed` and `Dismissed` are absorbing as far as notifications go.
/// `Dismissed` can be reverted to `Open` by an explicit re-track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrStatus {
    Open,
    Merged,
    Closed,
    Dismissed,
}

impl PrStatus {
    pub const ALL: [PrStatus; 4] = [
        PrStatus::Open,
        PrStatus::Merged,
        PrStatus::Closed,
        PrStatus::Dismissed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrStatus::Open => "open",
            PrStatus::Merged => "merged",
            PrStatus::Closed => "closed",
            PrStatus::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for PrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown PR status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for PrStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Why a PR was considered interesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchReason {
    Keyword,
    Ownership,
    Both,
    None,
}

impl MatchReason {
    pub fn classify(keyword_hit: bool, ownership_hit: bool) -> Self {
        match (keyword_hit, ownership_hit) {
            (true, true) => MatchReason::Both,
            (true, false) => MatchReason::Keyword,
            (false, true) => MatchReason::Ownership,
            (false, false) => MatchReason::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchReason::Keyword => "keyword",
            MatchReason::Ownership => "ownership",
            MatchReason::Both => "both",
            MatchReason::None => "none",
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A team whose owned paths intersect a PR's changed files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMatch {
    pub team: String,
    /// Matching filenames, in the PR's file order.
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchDetails {
    pub matched_keywords: Vec<String>,
    pub matched_teams: Vec<TeamMatch>,
}

/// A pull request the service has decided to watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPr {
    pub id: TrackedPrId,
    pub pr_number: PrNumber,
    pub title: String,
    pub author: String,
    pub url: String,
    pub branch: String,
    pub description: Option<String>,
    /// Logins ever requested for review. Only grows.
    pub reviewers: BTreeSet<String>,
    pub status: PrStatus,
    pub is_draft: bool,
    pub match_reason: MatchReason,
    pub match_details: MatchDetails,
    pub opened_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    /// Bumped by the store on every successful update.
    pub version: u64,
}

impl TrackedPr {
    pub fn is_open(&self) -> bool {
        self.status == PrStatus::Open
    }

    /// Adds reviewers to the set. Returns true if anything new was added.
    pub fn merge_reviewers<I, S>(&mut self, reviewers: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.reviewers.len();
        self.reviewers.extend(reviewers.into_iter().map(Into::into));
        self.reviewers.len() != before
    }
}

/// Fields needed to start tracking a PR. The store assigns the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrackedPr {
    pub pr_number: PrNumber,
    pub title: String,
    pub author: String,
    pub url: String,
    pub branch: String,
    pub description: Option<String>,
    pub reviewers: BTreeSet<String>,
    pub is_draft: bool,
    pub match_reason: MatchReason,
    pub match_details: MatchDetails,
    pub opened_at: DateTime<Utc>,
}

/// One observed head commit of a tracked PR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrChange {
    pub id: ChangeId,
    pub tracked_pr_id: TrackedPrId,
    pub commit_sha: Sha,
    pub summary: String,
    pub files_changed: Vec<String>,
    pub diff_stats: String,
    pub created_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrChange {
    pub tracked_pr_id: TrackedPrId,
    pub commit_sha: Sha,
    pub summary: String,
    pub files_changed: Vec<String>,
    pub diff_stats: String,
    pub notified_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_status() -> impl Strategy<Value = PrStatus> {
        prop::sample::select(PrStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn status_parses_its_own_name(status in arb_status()) {
            prop_assert_eq!(status.as_str().parse::<PrStatus>().unwrap(), status);
            prop_assert_eq!(status.as_str().to_uppercase().parse::<PrStatus>().unwrap(), status);
        }

        #[test]
        fn status_serializes_as_lowercase_name(status in arb_status()) {
            let json = serde_json::to_string(&status).unwrap();
            prop_assert_eq!(json, format!("\"{}\"", status.as_str()));
        }

        #[test]
        fn classify_is_none_only_without_hits(k: bool, o: bool) {
            prop_assert_eq!(MatchReason::classify(k, o) == MatchReason::None, !k && !o);
        }
    }

    #[test]
    fn unknown_status_rejected() {
        assert!("all".parse::<PrStatus>().is_err());
    }

    #[test]
    fn classify_covers_every_combination() {
        assert_eq!(MatchReason::classify(true, true), MatchReason::Both);
        assert_eq!(MatchReason::classify(true, false), MatchReason::Keyword);
        assert_eq!(MatchReason::classify(false, true), MatchReason::Ownership);
        assert_eq!(MatchReason::classify(false, false), MatchReason::None);
    }

    #[test]
    fn merge_reviewers_reports_growth() {
        let now = Utc::now();
        let mut pr = TrackedPr {
            id: TrackedPrId(1),
            pr_number: PrNumber(10),
            title: "t".into(),
            author: "a".into(),
            url: "u".into(),
            branch: "b".into(),
            description: None,
            reviewers: BTreeSet::from(["alice".to_string()]),
            status: PrStatus::Open,
            is_draft: false,
            match_reason: MatchReason::Keyword,
            match_details: MatchDetails::default(),
            opened_at: now,
            created_at: now,
            updated_at: now,
            merged_at: None,
            version: 0,
        };
        assert!(!pr.merge_reviewers(["alice"]));
        assert!(pr.merge_reviewers(["bob", "alice"]));
        assert_eq!(
            pr.reviewers.iter().cloned().collect::<Vec<_>>(),
            vec!["alice", "bob"]
        );
    }
}

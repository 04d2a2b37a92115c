//! Typed `pull_request` webhook events.

use crate::types::{OpenPr, PrState, RepoId, Sha};

/// The `action` of a `pull_request` delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrAction {
    Opened,
    Reopened,
    /// New commits were pushed to the head branch.
    Synchronize,
    Closed,
    /// Any other action (labeled, edited, review_requested, ...).
    Other(String),
}

impl From<&str> for PrAction {
    fn from(action: &str) -> Self {
        match action {
            "opened" => PrAction::Opened,
            "reopened" => PrAction::Reopened,
            "synchronize" => PrAction::Synchronize,
            "closed" => PrAction::Closed,
            other => PrAction::Other(other.to_string()),
        }
    }
}

impl PrAction {
    pub fn as_str(&self) -> &str {
        match self {
            PrAction::Opened => "opened",
            PrAction::Reopened => "reopened",
            PrAction::Synchronize => "synchronize",
            PrAction::Closed => "closed",
            PrAction::Other(action) => action,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub action: PrAction,
    pub pr: OpenPr,
    /// State as reported in the payload, with `merged` and `merged_at`.
    pub state: PrState,
    /// Previous head, on `synchronize`.
    pub before: Option<Sha>,
    /// New head, on `synchronize`.
    pub after: Option<Sha>,
    /// `owner/name` of the repository the delivery came from.
    pub repository: Option<String>,
}

impl PullRequestEvent {
    /// The head the event reports: `after` if present, else the PR's head.
    pub fn head(&self) -> &Sha {
        self.after.as_ref().unwrap_or(&self.pr.head_sha)
    }

    /// Whether the delivery is for `repo`. Payloads without a repository
    /// are assumed to be.
    pub fn is_for(&self, repo: &RepoId) -> bool {
        self.repository
            .as_deref()
            .is_none_or(|name| name.eq_ignore_ascii_case(&repo.to_string()))
    }
}

//! Shared test doubles, fixtures and generators for property-based testing.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use crate::github::{GitHubApiError, SourceHost};
use crate::notify::{NotificationEvent, Notifier, NotifyError};
use crate::types::{
    ChangedFile, MatchDetails, MatchReason, NewTrackedPr, OpenPr, PrDetails, PrNumber, PrSnapshot,
    PrState, Sha,
};

pub fn arb_changed_file() -> impl Strategy<Value = ChangedFile> {
    (
        "[a-z]{1,8}(/[a-z]{1,8}){0,3}\\.[a-z]{1,3}",
        prop_oneof![Just("added"), Just("modified"), Just("removed"), Just("renamed")],
        0u64..500,
        0u64..500,
    )
        .prop_map(|(filename, status, additions, deletions)| ChangedFile {
            filename,
            status: status.to_string(),
            additions,
            deletions,
            patch: None,
        })
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn changed_file(filename: &str, status: &str, additions: u64, deletions: u64) -> ChangedFile {
    ChangedFile {
        filename: filename.to_string(),
        status: status.to_string(),
        additions,
        deletions,
        patch: None,
    }
}

/// An open PR titled "PR #n" on branch `feature-n` with head `sha-n`.
pub fn open_pr(n: u64) -> OpenPr {
    OpenPr {
        number: PrNumber(n),
        title: format!("PR #{n}"),
        body: None,
        author: "alice".to_string(),
        url: format!("https://github.com/o/r/pull/{n}"),
        branch: format!("feature-{n}"),
        head_sha: Sha::new(format!("sha-{n}")),
        created_at: epoch(),
        is_draft: false,
        requested_reviewers: Vec::new(),
    }
}

pub fn new_tracked(n: u64) -> NewTrackedPr {
    let pr = open_pr(n);
    NewTrackedPr {
        pr_number: pr.number,
        title: pr.title,
        author: pr.author,
        url: pr.url,
        branch: pr.branch,
        description: None,
        reviewers: BTreeSet::new(),
        is_draft: false,
        match_reason: MatchReason::Keyword,
        match_details: MatchDetails {
            matched_keywords: vec!["auth".to_string()],
            matched_teams: Vec::new(),
        },
        opened_at: epoch(),
    }
}

/// Number of calls each [`SourceHost`] method has received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_open_prs: usize,
    pub get_pr_state: usize,
    pub get_pr_details: usize,
    pub list_pr_files: usize,
    pub get_file_content: usize,
    pub compare_commits: usize,
}

#[derive(Debug, Default)]
struct HostState {
    open: BTreeMap<PrNumber, OpenPr>,
    /// Closed PRs, keyed by number. Never listed as open.
    closed: HashMap<PrNumber, PrSnapshot>,
    files: HashMap<PrNumber, Vec<ChangedFile>>,
    details: HashMap<PrNumber, PrDetails>,
    contents: HashMap<String, String>,
    failing_contents: HashSet<String>,
    failing_prs: HashSet<PrNumber>,
    listing_fails: bool,
    calls: CallCounts,
}

/// In-memory GitHub with call counters and failure injection.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut HostState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_open_pr(&self, pr: OpenPr, files: Vec<ChangedFile>) {
        self.with_state(|s| {
            s.closed.remove(&pr.number);
            s.files.insert(pr.number, files);
            s.open.insert(pr.number, pr);
        });
    }

    pub fn set_files(&self, pr: PrNumber, files: Vec<ChangedFile>) {
        self.with_state(|s| s.files.insert(pr, files));
    }

    pub fn set_details(&self, pr: PrNumber, details: PrDetails) {
        self.with_state(|s| s.details.insert(pr, details));
    }

    /// Moves an open PR's head.
    pub fn push(&self, pr: PrNumber, head: &str) {
        self.with_state(|s| {
            if let Some(open) = s.open.get_mut(&pr) {
                open.head_sha = Sha::new(head);
            }
        });
    }

    pub fn set_title(&self, pr: PrNumber, title: &str) {
        self.with_state(|s| {
            if let Some(open) = s.open.get_mut(&pr) {
                open.title = title.to_string();
            }
        });
    }

    pub fn set_reviewers(&self, pr: PrNumber, reviewers: &[&str], is_draft: bool) {
        self.with_state(|s| {
            if let Some(open) = s.open.get_mut(&pr) {
                open.requested_reviewers = reviewers.iter().map(|r| r.to_string()).collect();
                open.is_draft = is_draft;
            }
        });
    }

    /// Closes a PR, merged or not. It stops appearing in the open listing.
    pub fn close(&self, pr: PrNumber, merged_at: Option<DateTime<Utc>>) {
        self.with_state(|s| {
            let open = s.open.remove(&pr).unwrap_or_else(|| open_pr(pr.0));
            let state = match merged_at {
                Some(at) => PrState::Merged { merged_at: Some(at) },
                None => PrState::Closed,
            };
            s.closed.insert(pr, snapshot_of(&open, state));
        });
    }

    pub fn set_file(&self, path: &str, content: &str) {
        self.with_state(|s| {
            s.failing_contents.remove(path);
            s.contents.insert(path.to_string(), content.to_string());
        });
    }

    /// Makes every fetch of `path` fail with a transient error.
    pub fn fail_file(&self, path: &str) {
        self.with_state(|s| s.failing_contents.insert(path.to_string()));
    }

    /// Makes every per-PR call for `pr` fail.
    pub fn fail_pr(&self, pr: PrNumber) {
        self.with_state(|s| s.failing_prs.insert(pr));
    }

    pub fn heal_pr(&self, pr: PrNumber) {
        self.with_state(|s| s.failing_prs.remove(&pr));
    }

    pub fn fail_listing(&self, fail: bool) {
        self.with_state(|s| s.listing_fails = fail);
    }

    pub fn calls(&self) -> CallCounts {
        self.with_state(|s| s.calls)
    }

    pub fn file_fetches(&self) -> usize {
        self.calls().get_file_content
    }

    fn check_pr(s: &HostState, pr: PrNumber) -> Result<(), GitHubApiError> {
        if s.failing_prs.contains(&pr) {
            return Err(GitHubApiError::transient_without_source(format!(
                "injected failure for {pr}"
            )));
        }
        Ok(())
    }
}

fn snapshot_of(pr: &OpenPr, state: PrState) -> PrSnapshot {
    PrSnapshot {
        number: pr.number,
        state,
        head_sha: pr.head_sha.clone(),
        title: pr.title.clone(),
        is_draft: pr.is_draft,
        requested_reviewers: pr.requested_reviewers.clone(),
    }
}

fn not_found(what: impl std::fmt::Display) -> GitHubApiError {
    GitHubApiError {
        status_code: Some(404),
        ..GitHubApiError::permanent_without_source(format!("{what} not found"))
    }
}

impl SourceHost for FakeHost {
    async fn list_open_prs(&self) -> Result<Vec<OpenPr>, GitHubApiError> {
        self.with_state(|s| {
            s.calls.list_open_prs += 1;
            if s.listing_fails {
                return Err(GitHubApiError::transient_without_source(
                    "injected listing failure",
                ));
            }
            Ok(s.open.values().cloned().collect())
        })
    }

    async fn get_pr_state(&self, pr: PrNumber) -> Result<PrSnapshot, GitHubApiError> {
        self.with_state(|s| {
            s.calls.get_pr_state += 1;
            Self::check_pr(s, pr)?;
            if let Some(open) = s.open.get(&pr) {
                return Ok(snapshot_of(open, PrState::Open));
            }
            s.closed.get(&pr).cloned().ok_or_else(|| not_found(pr))
        })
    }

    async fn get_pr_details(&self, pr: PrNumber) -> Result<PrDetails, GitHubApiError> {
        self.with_state(|s| {
            s.calls.get_pr_details += 1;
            Self::check_pr(s, pr)?;
            if let Some(details) = s.details.get(&pr) {
                return Ok(*details);
            }
            let files = s.files.get(&pr).map(Vec::as_slice).unwrap_or_default();
            Ok(PrDetails {
                additions: files.iter().map(|f| f.additions).sum(),
                deletions: files.iter().map(|f| f.deletions).sum(),
                changed_files: files.len() as u64,
            })
        })
    }

    async fn list_pr_files(&self, pr: PrNumber) -> Result<Vec<ChangedFile>, GitHubApiError> {
        self.with_state(|s| {
            s.calls.list_pr_files += 1;
            Self::check_pr(s, pr)?;
            Ok(s.files.get(&pr).cloned().unwrap_or_default())
        })
    }

    async fn get_file_content(
        &self,
        path: &str,
        _git_ref: Option<&str>,
    ) -> Result<Option<String>, GitHubApiError> {
        self.with_state(|s| {
            s.calls.get_file_content += 1;
            if s.failing_contents.contains(path) {
                return Err(GitHubApiError::transient_without_source(format!(
                    "injected failure for {path}"
                )));
            }
            Ok(s.contents.get(path).cloned())
        })
    }

    async fn compare_commits(
        &self,
        _base: &str,
        _head: &str,
    ) -> Result<Vec<ChangedFile>, GitHubApiError> {
        self.with_state(|s| {
            s.calls.compare_commits += 1;
            Ok(Vec::new())
        })
    }
}

/// Collects every event it is handed. Optionally refuses them all.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
    reject: bool,
}

impl RecordingNotifier {
    /// A notifier whose every delivery fails (events are still recorded).
    pub fn rejecting() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: crate::notify::NotificationKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event.clone());
        if self.reject {
            return Err(NotifyError::Rejected("recording notifier rejects".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_prs_leave_the_listing() {
        let host = FakeHost::new();
        host.add_open_pr(open_pr(1), vec![]);
        host.add_open_pr(open_pr(2), vec![]);
        host.close(PrNumber(1), Some(epoch()));

        let listed: Vec<_> = host
            .list_open_prs()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.number)
            .collect();
        assert_eq!(listed, vec![PrNumber(2)]);
        assert!(host.get_pr_state(PrNumber(1)).await.unwrap().state.is_merged());
        assert!(host.get_pr_state(PrNumber(3)).await.unwrap_err().is_not_found());
        assert_eq!(host.calls().get_pr_state, 2);
    }
}

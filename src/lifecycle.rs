//! The tracked-PR state machine.
//!
//! [`Tracker`] owns everything a transition needs (source host, store,
//! notifier, ownership cache and interest rules). The reconciliation loop and
//! the webhook handler both drive PRs through it and never call each other.
//!
//! ```text
//!   (untracked) ──interesting──▶ open ──closed──▶ merged | closed
//!                                 │ ▲                    ▲
//!                         dismiss │ │ track              │ closed (silent)
//!                                 ▼ │                    │
//!                              dismissed ────────────────┘
//! ```
//!
//! Every write goes through [`modify_tracked`], so a transition re-checks the
//! status it starts from on each attempt. Two triggers racing to close the
//! same PR therefore produce exactly one transition and one notification.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::InterestsConfig;
use crate::github::{GitHubApiError, SourceHost};
use crate::interest::{MatchInput, MatchResult, OwnershipCache, evaluate};
use crate::notify::{NotificationEvent, Notifier};
use crate::store::{Store, StoreError, modify_tracked};
use crate::summary::summarize;
use crate::types::{
    NewPrChange, NewTrackedPr, OpenPr, PrChange, PrNumber, PrState, PrStatus, Sha, TrackedPr,
    TrackedPrId,
};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Host(#[from] GitHubApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot {action} PR {pr} while it is {from}")]
    InvalidTransition {
        pr: PrNumber,
        from: PrStatus,
        action: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// What [`Tracker::track_if_interesting`] did with a PR.
#[derive(Debug, Clone)]
pub enum TrackOutcome {
    /// Already tracked in some status. Nothing was fetched.
    AlreadyTracked,

    /// Evaluated and found uninteresting.
    ///
    /// `conclusive` is false when some team's ownership file could not be
    /// read, so the PR may turn out interesting once it can.
    Uninteresting { conclusive: bool },

    /// Newly tracked.
    Tracked(TrackedPr),
}

/// How the source host says a PR ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    Merged { at: DateTime<Utc> },
    Closed,
}

impl Closure {
    /// The closure an authoritative state describes, `None` while open.
    pub fn from_state(state: &PrState) -> Option<Self> {
        match state {
            PrState::Open => None,
            PrState::Merged { merged_at } => Some(Closure::Merged {
                at: merged_at.unwrap_or_else(Utc::now),
            }),
            PrState::Closed => Some(Closure::Closed),
        }
    }
}

/// A manual status change requested through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// open → dismissed
    Dismiss,
    /// dismissed → open
    Track,
}

impl Transition {
    fn endpoints(self) -> (PrStatus, PrStatus) {
        match self {
            Transition::Dismiss => (PrStatus::Open, PrStatus::Dismissed),
            Transition::Track => (PrStatus::Dismissed, PrStatus::Open),
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Transition::Dismiss => "dismiss",
            Transition::Track => "track",
        }
    }
}

/// A new head to record against a tracked PR.
#[derive(Debug, Clone)]
pub struct CommitUpdate {
    pub head: Sha,
    pub title: String,
    pub reviewers: Vec<String>,
}

pub struct Tracker<H, N> {
    host: H,
    store: Arc<dyn Store>,
    notifier: N,
    ownership: OwnershipCache,
    interests: InterestsConfig,
}

impl<H, N> std::fmt::Debug for Tracker<H, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("ownership", &self.ownership)
            .field("interests", &self.interests)
            .finish_non_exhaustive()
    }
}

impl<H: SourceHost, N: Notifier> Tracker<H, N> {
    pub fn new(
        host: H,
        store: Arc<dyn Store>,
        notifier: N,
        ownership: OwnershipCache,
        interests: InterestsConfig,
    ) -> Self {
        Self {
            host,
            store,
            notifier,
            ownership,
            interests,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Starts tracking `pr` if it is untracked and matches the interest rules.
    ///
    /// A PR tracked in any status, dismissed included, is left alone.
    pub async fn track_if_interesting(&self, pr: &OpenPr) -> Result<TrackOutcome> {
        if self.store.get_by_number(pr.number)?.is_some() {
            return Ok(TrackOutcome::AlreadyTracked);
        }

        let files = self.host.list_pr_files(pr.number).await?;
        let owned = self
            .ownership
            .resolve_all(&self.host, &self.interests.teams)
            .await;
        let result = evaluate(
            &MatchInput {
                title: &pr.title,
                body: pr.body.as_deref(),
                branch: &pr.branch,
                files: &files,
            },
            &self.interests.keywords,
            &owned.teams,
        );
        if !result.is_interesting {
            debug!(
                pr = %pr.number,
                unavailable = ?owned.unavailable,
                "Not interesting"
            );
            return Ok(TrackOutcome::Uninteresting {
                conclusive: owned.is_complete(),
            });
        }

        let details = self.host.get_pr_details(pr.number).await?;
        let tracked = match self.store.create_tracked(new_tracked(pr, &result)) {
            Ok(tracked) => tracked,
            // The other trigger got there first.
            Err(StoreError::DuplicatePr(_)) => return Ok(TrackOutcome::AlreadyTracked),
            Err(e) => return Err(e.into()),
        };
        info!(
            pr = %pr.number,
            id = %tracked.id,
            reason = result.reason.as_str(),
            "Tracking PR"
        );

        self.dispatch(NotificationEvent::new_pr(pr, &result, details))
            .await;
        Ok(TrackOutcome::Tracked(tracked))
    }

    /// Records `update.head` as a new commit on an open tracked PR.
    ///
    /// Returns `None` without notifying when the head is already the last
    /// recorded commit, or when the PR stopped being open since `tracked` was
    /// read.
    pub async fn record_commit(
        &self,
        tracked: &TrackedPr,
        update: CommitUpdate,
    ) -> Result<Option<PrChange>> {
        let files = self.host.list_pr_files(tracked.pr_number).await?;
        let summary = summarize(&files);

        let Some(change) = self.store.record_change(NewPrChange {
            tracked_pr_id: tracked.id,
            commit_sha: update.head.clone(),
            summary: summary.summary,
            files_changed: summary.files_changed,
            diff_stats: summary.diff_stats,
            notified_at: Some(Utc::now()),
        })?
        else {
            debug!(pr = %tracked.pr_number, head = %update.head.short(), "Commit already recorded or PR no longer open");
            return Ok(None);
        };

        let updated = modify_tracked(self.store.as_ref(), tracked.id, |pr| {
            if !pr.is_open() {
                return false;
            }
            pr.title.clone_from(&update.title);
            pr.merge_reviewers(update.reviewers.iter().cloned());
            true
        })?;
        let title = updated.map_or_else(|| update.title.clone(), |pr| pr.title);
        info!(
            pr = %tracked.pr_number,
            head = %update.head.short(),
            stats = %change.diff_stats,
            "Recorded new commit"
        );

        self.dispatch(NotificationEvent::CodeChange {
            pr_number: tracked.pr_number,
            title,
            url: tracked.url.clone(),
            commit_sha: change.commit_sha.clone(),
            files_changed: change.files_changed.clone(),
            diff_stats: change.diff_stats.clone(),
            summary: change.summary.clone(),
        })
        .await;
        Ok(Some(change))
    }

    /// Moves an open or dismissed tracked PR to merged or closed.
    ///
    /// Returns `None` if the PR had already ended, in which case nothing is
    /// written and nothing is sent. A dismissed PR takes the new status but no
    /// Merge notification goes out for it.
    pub async fn close(&self, id: TrackedPrId, closure: Closure) -> Result<Option<TrackedPr>> {
        let mut was_open = false;
        let updated = modify_tracked(self.store.as_ref(), id, |pr| {
            if matches!(pr.status, PrStatus::Merged | PrStatus::Closed) {
                return false;
            }
            was_open = pr.is_open();
            match closure {
                Closure::Merged { at } => {
                    pr.status = PrStatus::Merged;
                    pr.merged_at = Some(at);
                }
                Closure::Closed => pr.status = PrStatus::Closed,
            }
            true
        })?;
        let Some(pr) = updated else {
            return Ok(None);
        };
        info!(pr = %pr.pr_number, status = %pr.status, was_open, "PR closed");

        if was_open && pr.status == PrStatus::Merged {
            self.dispatch(NotificationEvent::Merge {
                pr_number: pr.pr_number,
                title: pr.title.clone(),
                author: pr.author.clone(),
                url: pr.url.clone(),
            })
            .await;
        }
        Ok(Some(pr))
    }

    /// Unions in reviewers and overwrites the draft flag of an open PR.
    ///
    /// Writes only when something changed. Returns whether it wrote.
    pub fn refresh_metadata(
        &self,
        id: TrackedPrId,
        reviewers: &[String],
        is_draft: bool,
    ) -> Result<bool> {
        let updated = modify_tracked(self.store.as_ref(), id, |pr| {
            if !pr.is_open() {
                return false;
            }
            let grew = pr.merge_reviewers(reviewers.iter().cloned());
            let draft_changed = pr.is_draft != is_draft;
            pr.is_draft = is_draft;
            grew || draft_changed
        })?;
        Ok(updated.is_some())
    }

    /// Applies a manual dismiss or re-track.
    pub fn transition(&self, id: TrackedPrId, transition: Transition) -> Result<TrackedPr> {
        let (from, to) = transition.endpoints();
        let mut rejected = None;
        let updated = modify_tracked(self.store.as_ref(), id, |pr| {
            if pr.status != from {
                rejected = Some((pr.pr_number, pr.status));
                return false;
            }
            rejected = None;
            pr.status = to;
            true
        })?;

        match (updated, rejected) {
            (Some(pr), _) => {
                info!(pr = %pr.pr_number, status = %pr.status, "Status changed manually");
                Ok(pr)
            }
            (None, Some((pr, status))) => Err(LifecycleError::InvalidTransition {
                pr,
                from: status,
                action: transition.verb(),
            }),
            (None, None) => Err(StoreError::NotFound(id).into()),
        }
    }

    /// Sends an event. Failures are logged and go no further.
    async fn dispatch(&self, event: NotificationEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            error!(pr = %event.pr_number(), kind = ?event.kind(), error = %e, "Failed to send notification");
        }
    }
}

fn new_tracked(pr: &OpenPr, result: &MatchResult) -> NewTrackedPr {
    NewTrackedPr {
        pr_number: pr.number,
        title: pr.title.clone(),
        author: pr.author.clone(),
        url: pr.url.clone(),
        branch: pr.branch.clone(),
        description: pr.body.clone(),
        reviewers: pr.requested_reviewers.iter().cloned().collect(),
        is_draft: pr.is_draft,
        match_reason: result.reason,
        match_details: result.details.clone(),
        opened_at: pr.created_at,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::TeamInterest;
    use crate::notify::NotificationKind;
    use crate::store::MemoryStore;
    use crate::test_utils::{FakeHost, RecordingNotifier, changed_file, epoch, open_pr};
    use crate::types::{MatchReason, PrDetails};

    pub(crate) type TestTracker = Tracker<FakeHost, RecordingNotifier>;

    /// Keyword "auth", team "platform" owning `src/platform/**`.
    pub(crate) fn tracker_with(notifier: RecordingNotifier) -> TestTracker {
        let host = FakeHost::new();
        host.set_file("teams/platform.yml", "paths:\n  - src/platform/**\n");
        Tracker::new(
            host,
            Arc::new(MemoryStore::new()),
            notifier,
            OwnershipCache::new(None),
            InterestsConfig {
                keywords: vec!["auth".to_string()],
                teams: vec![TeamInterest {
                    name: "platform".to_string(),
                    ownership_file: "teams/platform.yml".to_string(),
                }],
            },
        )
    }

    pub(crate) fn tracker() -> TestTracker {
        tracker_with(RecordingNotifier::default())
    }

    /// An open PR the rules match by keyword.
    pub(crate) fn interesting_pr(n: u64) -> OpenPr {
        OpenPr {
            title: format!("Fix auth bug {n}"),
            ..open_pr(n)
        }
    }

    async fn tracked(t: &TestTracker, n: u64) -> TrackedPr {
        let pr = interesting_pr(n);
        t.host()
            .add_open_pr(pr.clone(), vec![changed_file("src/a.rs", "modified", 1, 0)]);
        match t.track_if_interesting(&pr).await.unwrap() {
            TrackOutcome::Tracked(tracked) => tracked,
            other => panic!("expected to track, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tracks_matching_pr_and_notifies() {
        let t = tracker();
        let pr = OpenPr {
            requested_reviewers: vec!["bob".into()],
            ..interesting_pr(1)
        };
        t.host().add_open_pr(
            pr.clone(),
            vec![changed_file("src/platform/db.rs", "modified", 5, 1)],
        );

        let TrackOutcome::Tracked(tracked) = t.track_if_interesting(&pr).await.unwrap() else {
            panic!("expected PR to be tracked");
        };
        assert_eq!(tracked.status, PrStatus::Open);
        assert_eq!(tracked.match_reason, MatchReason::Both);
        assert_eq!(tracked.opened_at, epoch());
        assert!(tracked.reviewers.contains("bob"));

        let events = t.notifier().events();
        assert_eq!(events.len(), 1);
        let NotificationEvent::NewPr {
            files_changed,
            additions,
            ..
        } = &events[0]
        else {
            panic!("expected NewPr");
        };
        assert_eq!((*files_changed, *additions), (1, 5));
    }

    #[tokio::test]
    async fn new_pr_reports_host_totals() {
        // The file listing can be truncated; the totals come from the PR itself.
        let t = tracker();
        let pr = interesting_pr(1);
        t.host()
            .add_open_pr(pr.clone(), vec![changed_file("src/a.rs", "modified", 1, 1)]);
        t.host().set_details(
            pr.number,
            PrDetails {
                additions: 900,
                deletions: 40,
                changed_files: 3001,
            },
        );

        t.track_if_interesting(&pr).await.unwrap();
        let events = t.notifier().events();
        let NotificationEvent::NewPr {
            files_changed,
            additions,
            deletions,
            ..
        } = &events[0]
        else {
            panic!("expected NewPr");
        };
        assert_eq!((*files_changed, *additions, *deletions), (3001, 900, 40));
    }

    #[tokio::test]
    async fn uninteresting_pr_is_not_tracked() {
        let t = tracker();
        let pr = open_pr(2);
        t.host()
            .add_open_pr(pr.clone(), vec![changed_file("docs/x.md", "added", 1, 0)]);

        assert!(matches!(
            t.track_if_interesting(&pr).await.unwrap(),
            TrackOutcome::Uninteresting { conclusive: true }
        ));
        assert!(t.store().get_by_number(pr.number).unwrap().is_none());
        assert_eq!(t.host().calls().get_pr_details, 0);
        assert!(t.notifier().events().is_empty());
    }

    #[tokio::test]
    async fn tracking_is_idempotent_in_any_status() {
        let t = tracker();
        let first = tracked(&t, 3).await;
        t.transition(first.id, Transition::Dismiss).unwrap();

        let outcome = t.track_if_interesting(&interesting_pr(3)).await.unwrap();
        assert!(matches!(outcome, TrackOutcome::AlreadyTracked));
        assert_eq!(t.store().list_tracked(None).unwrap().len(), 1);
        assert_eq!(t.notifier().count(NotificationKind::NewPr), 1);
    }

    #[tokio::test]
    async fn failed_notification_keeps_the_record() {
        let t = tracker_with(RecordingNotifier::rejecting());
        tracked(&t, 4).await;
        assert!(t.store().get_by_number(PrNumber(4)).unwrap().is_some());
    }

    #[tokio::test]
    async fn record_commit_is_gated_on_last_sha() {
        let t = tracker();
        let pr = tracked(&t, 5).await;
        let update = CommitUpdate {
            head: Sha::new("head-1"),
            title: "Renamed".into(),
            reviewers: vec!["carol".into()],
        };

        let change = t.record_commit(&pr, update.clone()).await.unwrap().unwrap();
        assert_eq!(change.diff_stats, "1 files, +1 -0");
        assert!(change.notified_at.is_some());
        assert!(t.record_commit(&pr, update).await.unwrap().is_none());

        let stored = t.store().get_tracked(pr.id).unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert!(stored.reviewers.contains("carol"));
        assert_eq!(t.notifier().count(NotificationKind::CodeChange), 1);
    }

    #[tokio::test]
    async fn commit_after_dismissal_is_dropped() {
        let t = tracker();
        // Read while open, dismissed before the push is handled.
        let stale = tracked(&t, 9).await;
        t.transition(stale.id, Transition::Dismiss).unwrap();

        let update = CommitUpdate {
            head: Sha::new("late-push"),
            title: "Renamed".into(),
            reviewers: Vec::new(),
        };
        assert!(t.record_commit(&stale, update).await.unwrap().is_none());

        let stored = t.store().get_tracked(stale.id).unwrap().unwrap();
        assert_eq!(stored.status, PrStatus::Dismissed);
        assert_eq!(stored.title, stale.title);
        assert!(t.store().list_changes(stale.id).unwrap().is_empty());
        assert_eq!(t.notifier().count(NotificationKind::CodeChange), 0);
    }

    #[tokio::test]
    async fn close_happens_once() {
        let t = tracker();
        let pr = tracked(&t, 6).await;
        let merged = Closure::Merged { at: epoch() };

        let closed = t.close(pr.id, merged).await.unwrap().unwrap();
        assert_eq!(closed.status, PrStatus::Merged);
        assert_eq!(closed.merged_at, Some(epoch()));

        assert!(t.close(pr.id, merged).await.unwrap().is_none());
        assert!(t.close(pr.id, Closure::Closed).await.unwrap().is_none());
        assert_eq!(t.notifier().count(NotificationKind::Merge), 1);
        assert_eq!(
            t.store().get_tracked(pr.id).unwrap().unwrap().status,
            PrStatus::Merged
        );
    }

    #[tokio::test]
    async fn dismissed_pr_closes_silently() {
        let t = tracker();
        let pr = tracked(&t, 8).await;
        t.transition(pr.id, Transition::Dismiss).unwrap();

        let merged = t
            .close(pr.id, Closure::Merged { at: epoch() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merged.status, PrStatus::Merged);
        assert_eq!(merged.merged_at, Some(epoch()));
        assert_eq!(t.notifier().count(NotificationKind::Merge), 0);

        assert!(t.close(pr.id, Closure::Closed).await.unwrap().is_none());
        assert!(matches!(
            t.transition(pr.id, Transition::Track),
            Err(LifecycleError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn plain_close_sends_nothing() {
        let t = tracker();
        let pr = tracked(&t, 7).await;
        let closed = t.close(pr.id, Closure::Closed).await.unwrap().unwrap();
        assert_eq!(closed.status, PrStatus::Closed);
        assert_eq!(closed.merged_at, None);
        assert_eq!(t.notifier().count(NotificationKind::Merge), 0);
    }

    #[tokio::test]
    async fn refresh_writes_only_on_change() {
        let t = tracker();
        let pr = tracked(&t, 8).await;

        assert!(!t.refresh_metadata(pr.id, &[], false).unwrap());
        assert!(t.refresh_metadata(pr.id, &["dave".into()], true).unwrap());
        assert!(!t.refresh_metadata(pr.id, &["dave".into()], true).unwrap());
        // Reviewers never shrink.
        assert!(t.refresh_metadata(pr.id, &[], false).unwrap());

        let stored = t.store().get_tracked(pr.id).unwrap().unwrap();
        assert!(stored.reviewers.contains("dave"));
        assert!(!stored.is_draft);
    }

    #[tokio::test]
    async fn manual_transitions_check_the_current_status() {
        let t = tracker();
        let pr = tracked(&t, 9).await;

        let err = t.transition(pr.id, Transition::Track).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: PrStatus::Open,
                ..
            }
        ));

        let dismissed = t.transition(pr.id, Transition::Dismiss).unwrap();
        assert_eq!(dismissed.status, PrStatus::Dismissed);
        assert!(t.close(pr.id, Closure::Closed).await.unwrap().is_none());

        let reopened = t.transition(pr.id, Transition::Track).unwrap();
        assert_eq!(reopened.status, PrStatus::Open);

        let missing = t.transition(TrackedPrId(999), Transition::Dismiss).unwrap_err();
        assert!(matches!(
            missing,
            LifecycleError::Store(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn closure_from_state() {
        assert_eq!(Closure::from_state(&PrState::Open), None);
        assert_eq!(
            Closure::from_state(&PrState::Closed),
            Some(Closure::Closed)
        );
        assert_eq!(
            Closure::from_state(&PrState::Merged {
                merged_at: Some(epoch())
            }),
            Some(Closure::Merged { at: epoch() })
        );
    }
}

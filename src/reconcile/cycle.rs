//! One reconciliation cycle.
//!
//! A cycle runs four phases in order:
//!
//! 1. **Discover**: evaluate untracked open PRs, at most
//!    `max_new_prs_per_cycle` of them.
//! 2. **Refresh**: copy reviewers and draft flags from the listing onto open
//!    tracked PRs. No API calls.
//! 3. **Drift sync**: open tracked PRs missing from the listing were probably
//!    closed while a webhook went astray. Ask GitHub and close them.
//! 4. **Deep check**: compare the head of up to
//!    `max_tracked_checks_per_cycle` open tracked PRs against their last
//!    recorded commit, round-robin.
//!
//! Errors for one PR are logged and skip that PR until the next cycle. If the
//! listing itself fails, phases 1-3 are skipped and the deep check still runs.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::github::SourceHost;
use crate::interest::OWNERSHIP_TTL;
use crate::lifecycle::{Closure, CommitUpdate, LifecycleError, TrackOutcome, Tracker};
use crate::notify::Notifier;
use crate::types::{OpenPr, PrNumber, PrStatus, Sha, TrackedPr};

use super::poll::PollConfig;

/// What a cycle did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Open PRs listed. `None` when the listing failed.
    pub listed: Option<usize>,
    /// Untracked PRs run through the matcher.
    pub evaluated: usize,
    /// Untracked PRs left for a later cycle by the cap.
    pub deferred: usize,
    pub newly_tracked: usize,
    pub refreshed: usize,
    pub drift_checked: usize,
    pub deep_checked: usize,
    pub new_commits: usize,
    /// Tracked PRs moved to merged or closed.
    pub closed: usize,
    pub errors: usize,
}

/// The inputs an uninteresting verdict was reached on.
#[derive(Debug, Clone)]
struct Verdict {
    head: Sha,
    title: String,
    body: Option<String>,
    at: Instant,
}

impl Verdict {
    fn of(pr: &OpenPr, at: Instant) -> Self {
        Verdict {
            head: pr.head_sha.clone(),
            title: pr.title.clone(),
            body: pr.body.clone(),
            at,
        }
    }

    /// Whether re-evaluating `pr` could give a different answer.
    fn still_holds(&self, pr: &OpenPr, now: Instant) -> bool {
        self.head == pr.head_sha
            && self.title == pr.title
            && self.body == pr.body
            && now.saturating_duration_since(self.at) < OWNERSHIP_TTL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeepCheck {
    Unchanged,
    NewCommit,
    Closed,
}

pub struct Reconciler<H, N> {
    tracker: Arc<Tracker<H, N>>,
    config: PollConfig,
    /// Untracked PRs found uninteresting with every ownership file readable,
    /// so they don't use up the discovery cap every cycle.
    uninteresting: HashMap<PrNumber, Verdict>,
    /// Last PR deep-checked. The next batch starts after it.
    cursor: Option<PrNumber>,
}

impl<H: SourceHost, N: Notifier> Reconciler<H, N> {
    pub fn new(tracker: Arc<Tracker<H, N>>, config: PollConfig) -> Self {
        Self {
            tracker,
            config,
            uninteresting: HashMap::new(),
            cursor: None,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    #[instrument(skip(self))]
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        let mut drift_checked = HashSet::new();
        match self.tracker.host().list_open_prs().await {
            Ok(open) => {
                report.listed = Some(open.len());
                self.discover(&open, &mut report).await;
                self.refresh(&open, &mut report);
                drift_checked = self.sync_drift(&open, &mut report).await;
            }
            Err(e) => {
                warn!(error = %e, "Could not list open PRs, only deep-checking this cycle");
                report.errors += 1;
            }
        }
        self.deep_check(&drift_checked, &mut report).await;

        info!(
            listed = ?report.listed,
            evaluated = report.evaluated,
            deferred = report.deferred,
            tracked = report.newly_tracked,
            refreshed = report.refreshed,
            drift_checked = report.drift_checked,
            deep_checked = report.deep_checked,
            commits = report.new_commits,
            closed = report.closed,
            errors = report.errors,
            "Reconciliation cycle complete"
        );
        report
    }

    async fn discover(&mut self, open: &[OpenPr], report: &mut CycleReport) {
        let tracked = match self.tracker.store().tracked_numbers() {
            Ok(tracked) => tracked,
            Err(e) => {
                warn!(error = %e, "Could not read tracked PRs, skipping discovery");
                report.errors += 1;
                return;
            }
        };

        let listed: HashSet<PrNumber> = open.iter().map(|pr| pr.number).collect();
        self.uninteresting.retain(|n, _| listed.contains(n));

        let now = Instant::now();
        for pr in open {
            if tracked.contains(&pr.number) {
                continue;
            }
            if self
                .uninteresting
                .get(&pr.number)
                .is_some_and(|v| v.still_holds(pr, now))
            {
                continue;
            }
            if report.evaluated == self.config.max_new_prs_per_cycle {
                report.deferred += 1;
                continue;
            }

            report.evaluated += 1;
            match self.tracker.track_if_interesting(pr).await {
                Ok(TrackOutcome::Tracked(_)) => {
                    report.newly_tracked += 1;
                    self.uninteresting.remove(&pr.number);
                }
                Ok(TrackOutcome::Uninteresting { conclusive: true }) => {
                    self.uninteresting.insert(pr.number, Verdict::of(pr, now));
                }
                Ok(TrackOutcome::Uninteresting { conclusive: false }) => {
                    self.uninteresting.remove(&pr.number);
                }
                Ok(TrackOutcome::AlreadyTracked) => {}
                Err(e) => {
                    warn!(pr = %pr.number, error = %e, "Could not evaluate PR");
                    report.errors += 1;
                }
            }
        }

        if report.deferred > 0 {
            debug!(deferred = report.deferred, "Discovery cap reached");
        }
    }

    fn refresh(&self, open: &[OpenPr], report: &mut CycleReport) {
        let tracked = match self.open_tracked() {
            Ok(tracked) => tracked,
            Err(e) => {
                warn!(error = %e, "Could not read tracked PRs, skipping refresh");
                report.errors += 1;
                return;
            }
        };

        for pr in open {
            let Some(t) = tracked.iter().find(|t| t.pr_number == pr.number) else {
                continue;
            };
            match self
                .tracker
                .refresh_metadata(t.id, &pr.requested_reviewers, pr.is_draft)
            {
                Ok(true) => report.refreshed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(pr = %pr.number, error = %e, "Could not refresh PR metadata");
                    report.errors += 1;
                }
            }
        }
    }

    /// Returns the PRs it asked GitHub about.
    async fn sync_drift(&self, open: &[OpenPr], report: &mut CycleReport) -> HashSet<PrNumber> {
        let mut checked = HashSet::new();
        let tracked = match self.open_tracked() {
            Ok(tracked) => tracked,
            Err(e) => {
                warn!(error = %e, "Could not read tracked PRs, skipping drift sync");
                report.errors += 1;
                return checked;
            }
        };

        let listed: HashSet<PrNumber> = open.iter().map(|pr| pr.number).collect();
        for pr in tracked.iter().filter(|t| !listed.contains(&t.pr_number)) {
            checked.insert(pr.pr_number);
            report.drift_checked += 1;
            match self.sync_closure(pr).await {
                Ok(true) => report.closed += 1,
                Ok(false) => debug!(pr = %pr.pr_number, "Missing from listing but still open"),
                Err(e) => {
                    warn!(pr = %pr.pr_number, error = %e, "Could not sync drifted PR");
                    report.errors += 1;
                }
            }
        }
        checked
    }

    async fn sync_closure(&self, pr: &TrackedPr) -> Result<bool, LifecycleError> {
        let snapshot = self.tracker.host().get_pr_state(pr.pr_number).await?;
        match Closure::from_state(&snapshot.state) {
            Some(closure) => Ok(self.tracker.close(pr.id, closure).await?.is_some()),
            None => Ok(false),
        }
    }

    async fn deep_check(&mut self, skip: &HashSet<PrNumber>, report: &mut CycleReport) {
        let candidates: Vec<TrackedPr> = match self.open_tracked() {
            Ok(tracked) => tracked
                .into_iter()
                .filter(|t| !skip.contains(&t.pr_number))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Could not read tracked PRs, skipping deep check");
                report.errors += 1;
                return;
            }
        };

        let numbers: Vec<PrNumber> = candidates.iter().map(|t| t.pr_number).collect();
        let batch = next_batch(
            &numbers,
            self.cursor,
            self.config.max_tracked_checks_per_cycle,
        );
        if let Some(last) = batch.last() {
            self.cursor = Some(*last);
        }

        let batch: BTreeSet<PrNumber> = batch.into_iter().collect();
        for pr in candidates.iter().filter(|t| batch.contains(&t.pr_number)) {
            report.deep_checked += 1;
            match self.deep_check_one(pr).await {
                Ok(DeepCheck::Unchanged) => {}
                Ok(DeepCheck::NewCommit) => report.new_commits += 1,
                Ok(DeepCheck::Closed) => report.closed += 1,
                Err(e) => {
                    warn!(pr = %pr.pr_number, error = %e, "Deep check failed");
                    report.errors += 1;
                }
            }
        }
    }

    async fn deep_check_one(&self, pr: &TrackedPr) -> Result<DeepCheck, LifecycleError> {
        let snapshot = self.tracker.host().get_pr_state(pr.pr_number).await?;
        if let Some(closure) = Closure::from_state(&snapshot.state) {
            let closed = self.tracker.close(pr.id, closure).await?;
            return Ok(if closed.is_some() {
                DeepCheck::Closed
            } else {
                DeepCheck::Unchanged
            });
        }

        let last = self.tracker.store().last_change(pr.id)?;
        if last.is_some_and(|c| c.commit_sha == snapshot.head_sha) {
            return Ok(DeepCheck::Unchanged);
        }

        let recorded = self
            .tracker
            .record_commit(
                pr,
                CommitUpdate {
                    head: snapshot.head_sha,
                    title: snapshot.title,
                    reviewers: snapshot.requested_reviewers,
                },
            )
            .await?;
        Ok(if recorded.is_some() {
            DeepCheck::NewCommit
        } else {
            DeepCheck::Unchanged
        })
    }

    fn open_tracked(&self) -> Result<Vec<TrackedPr>, crate::store::StoreError> {
        self.tracker.store().list_tracked(Some(PrStatus::Open))
    }
}

/// Picks up to `cap` of the sorted `numbers`, starting after `cursor` and
/// wrapping around.
fn next_batch(numbers: &[PrNumber], cursor: Option<PrNumber>, cap: usize) -> Vec<PrNumber> {
    let start = cursor.map_or(0, |c| numbers.partition_point(|n| *n <= c));
    numbers
        .iter()
        .cycle()
        .skip(start)
        .take(cap.min(numbers.len()))
        .copied()
        .collect()
}

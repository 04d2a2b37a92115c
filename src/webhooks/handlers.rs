//! Applies `pull_request` events to tracked PRs.
//!
//! This is the push-driven twin of the reconciliation loop and goes through
//! the same [`Tracker`] transitions, so a delivery and a cycle racing on one
//! PR cannot create two records or notify twice for one commit.
//!
//! Any error is returned to the caller, which answers 500 so that GitHub
//! redelivers.

use thiserror::Error;
use tracing::{debug, info};

use crate::github::SourceHost;
use crate::lifecycle::{Closure, CommitUpdate, LifecycleError, TrackOutcome, Tracker};
use crate::notify::Notifier;
use crate::store::StoreError;

use super::events::{PrAction, PullRequestEvent};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Tracked,
    AlreadyTracked,
    Uninteresting,
    CommitRecorded,
    /// The pushed head was already recorded.
    CommitSeen,
    Closed,
    /// Nothing to do: untracked, not open, or an action we don't act on.
    Ignored,
}

pub async fn handle_pull_request<H: SourceHost, N: Notifier>(
    tracker: &Tracker<H, N>,
    event: &PullRequestEvent,
) -> Result<HandlerOutcome, HandlerError> {
    let pr = event.pr.number;
    let outcome = match &event.action {
        PrAction::Opened | PrAction::Reopened => match tracker.track_if_interesting(&event.pr).await? {
            TrackOutcome::Tracked(_) => HandlerOutcome::Tracked,
            TrackOutcome::AlreadyTracked => HandlerOutcome::AlreadyTracked,
            TrackOutcome::Uninteresting { .. } => HandlerOutcome::Uninteresting,
        },

        PrAction::Synchronize => {
            let Some(tracked) = tracker.store().get_by_number(pr)?.filter(|t| t.is_open()) else {
                debug!(%pr, "Push to an untracked or inactive PR");
                return Ok(HandlerOutcome::Ignored);
            };
            let update = CommitUpdate {
                head: event.head().clone(),
                title: event.pr.title.clone(),
                reviewers: event.pr.requested_reviewers.clone(),
            };
            match tracker.record_commit(&tracked, update).await? {
                Some(_) => HandlerOutcome::CommitRecorded,
                None => HandlerOutcome::CommitSeen,
            }
        }

        PrAction::Closed => {
            let Some(tracked) = tracker.store().get_by_number(pr)? else {
                return Ok(HandlerOutcome::Ignored);
            };
            // A "closed" delivery whose payload still says open carries no
            // usable closure.
            let Some(closure) = Closure::from_state(&event.state) else {
                return Ok(HandlerOutcome::Ignored);
            };
            match tracker.close(tracked.id, closure).await? {
                Some(_) => HandlerOutcome::Closed,
                None => HandlerOutcome::Ignored,
            }
        }

        PrAction::Other(action) => {
            debug!(%pr, action = %action, "Ignoring pull_request action");
            return Ok(HandlerOutcome::Ignored);
        }
    };

    info!(%pr, action = event.action.as_str(), ?outcome, "Handled pull_request event");
    Ok(outcome)
}

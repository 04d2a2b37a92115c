//! Outbound notifications.
//!
//! Lifecycle transitions emit a [`NotificationEvent`]; delivering it is the
//! job of a [`Notifier`]. Delivery is fire-and-forget: a failure is logged by
//! the caller and never undoes the state change that produced the event.

mod outbox;
mod toggled;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::interest::MatchResult;
use crate::types::{MatchDetails, MatchReason, PrNumber, Sha};

pub use outbox::OutboxNotifier;
pub use toggled::ToggledNotifier;

/// Prefix of every notification subject line.
pub const SUBJECT_PREFIX: &str = "[PR Watch]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// An interesting PR was seen for the first time.
    NewPr {
        pr_number: PrNumber,
        title: String,
        body: Option<String>,
        author: String,
        url: String,
        branch: String,
        reason: MatchReason,
        matches: MatchDetails,
        files_changed: u64,
        additions: u64,
        deletions: u64,
    },

    /// A tracked PR's head moved.
    CodeChange {
        pr_number: PrNumber,
        title: String,
        url: String,
        commit_sha: Sha,
        files_changed: Vec<String>,
        diff_stats: String,
        summary: String,
    },

    /// A tracked PR was merged.
    Merge {
        pr_number: PrNumber,
        title: String,
        author: String,
        url: String,
    },
}

/// Event kinds, for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    NewPr,
    CodeChange,
    Merge,
}

impl NotificationEvent {
    pub fn new_pr(
        pr: &crate::types::OpenPr,
        result: &MatchResult,
        details: crate::types::PrDetails,
    ) -> Self {
        NotificationEvent::NewPr {
            pr_number: pr.number,
            title: pr.title.clone(),
            body: pr.body.clone(),
            author: pr.author.clone(),
            url: pr.url.clone(),
            branch: pr.branch.clone(),
            reason: result.reason,
            matches: result.details.clone(),
            files_changed: details.changed_files,
            additions: details.additions,
            deletions: details.deletions,
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationEvent::NewPr { .. } => NotificationKind::NewPr,
            NotificationEvent::CodeChange { .. } => NotificationKind::CodeChange,
            NotificationEvent::Merge { .. } => NotificationKind::Merge,
        }
    }

    pub fn pr_number(&self) -> PrNumber {
        match self {
            NotificationEvent::NewPr { pr_number, .. }
            | NotificationEvent::CodeChange { pr_number, .. }
            | NotificationEvent::Merge { pr_number, .. } => *pr_number,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            NotificationEvent::NewPr {
                pr_number, title, ..
            } => format!("{SUBJECT_PREFIX} Interesting PR {pr_number}: {title}"),
            NotificationEvent::CodeChange {
                pr_number, title, ..
            } => format!("{SUBJECT_PREFIX} Changes in PR {pr_number}: {title}"),
            NotificationEvent::Merge {
                pr_number, title, ..
            } => format!("{SUBJECT_PREFIX} PR {pr_number} merged: {title}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Delivers notifications.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        event: &NotificationEvent,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Writes each notification to the log and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        info!(pr = %event.pr_number(), kind = ?event.kind(), subject = %event.subject(), "Notification");
        Ok(())
    }
}

/// The notifier the binary runs with, picked at startup.
#[derive(Debug)]
pub enum NotificationSink {
    Log(LoggingNotifier),
    Outbox(OutboxNotifier),
}

impl Notifier for NotificationSink {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        match self {
            NotificationSink::Log(n) => n.notify(event).await,
            NotificationSink::Outbox(n) => n.notify(event).await,
        }
    }
}

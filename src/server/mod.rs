//! HTTP server for the PR watcher.
//!
//! This module implements the HTTP server that:
//! - Accepts `pull_request` webhooks from GitHub and applies them immediately
//! - Exposes tracked PRs, their change history and per-status counts
//! - Provides health checks for liveness probes
//!
//! # Endpoints
//!
//! - `POST /api/webhooks/github` - GitHub webhook deliveries
//! - `GET /api/prs?status=<status|all>&sort=<desc|asc>` - Tracked PRs by last update
//! - `GET /api/prs/{id}` - One tracked PR with its change history
//! - `PATCH /api/prs/{id}` - Dismiss or re-track a PR
//! - `GET /api/stats` - Tracked PR counts per status
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::github::SourceHost;
use crate::lifecycle::Tracker;
use crate::notify::Notifier;
use crate::types::RepoId;

pub mod health;
pub mod prs;
pub mod webhook;

pub use health::health_handler;
pub use prs::{ApiError, get_pr_handler, list_prs_handler, stats_handler, update_pr_handler};
pub use webhook::{WebhookError, webhook_handler};

/// Shared application state.
///
/// Passed to all handlers via Axum's `State` extractor. The tracker is the
/// same one the reconciliation loop drives.
pub struct AppState<H, N> {
    inner: Arc<AppStateInner<H, N>>,
}

struct AppStateInner<H, N> {
    tracker: Arc<Tracker<H, N>>,

    /// Deliveries naming another repository are ignored.
    repo: RepoId,

    /// Webhook secret for HMAC-SHA256 signature verification.
    webhook_secret: Option<Vec<u8>>,
}

impl<H, N> Clone for AppState<H, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: SourceHost, N: Notifier> AppState<H, N> {
    pub fn new(
        tracker: Arc<Tracker<H, N>>,
        repo: RepoId,
        webhook_secret: Option<impl Into<Vec<u8>>>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                tracker,
                repo,
                webhook_secret: webhook_secret.map(Into::into),
            }),
        }
    }

    pub fn tracker(&self) -> &Tracker<H, N> {
        &self.inner.tracker
    }

    pub fn repo(&self) -> &RepoId {
        &self.inner.repo
    }

    /// Returns the webhook secret, if one is configured.
    pub fn webhook_secret(&self) -> Option<&[u8]> {
        self.inner.webhook_secret.as_deref()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<H, N>(app_state: AppState<H, N>) -> Router
where
    H: SourceHost + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/webhooks/github", post(webhook_handler::<H, N>))
        .route("/api/prs", get(list_prs_handler::<H, N>))
        .route(
            "/api/prs/{id}",
            get(get_pr_handler::<H, N>).patch(update_pr_handler::<H, N>),
        )
        .route("/api/stats", get(stats_handler::<H, N>))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

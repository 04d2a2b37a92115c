//! Read and manage tracked PRs over HTTP.
//!
//! These endpoints read the store directly. The only write is the manual
//! dismiss / re-track, which goes through [`Tracker::transition`] like every
//! other status change.
//!
//! [`Tracker::transition`]: crate::lifecycle::Tracker::transition

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use super::AppState;
use crate::github::SourceHost;
use crate::lifecycle::{LifecycleError, Transition};
use crate::notify::Notifier;
use crate::store::StoreError;
use crate::types::tracked::UnknownStatus;
use crate::types::{PrChange, PrStatus, TrackedPr, TrackedPrId};

/// Errors returned by the PR API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("tracked PR {0} not found")]
    NotFound(TrackedPrId),

    #[error("{0}")]
    InvalidStatus(#[from] UnknownStatus),

    #[error("unknown action {0:?}, expected \"dismiss\" or \"track\"")]
    UnknownAction(String),

    #[error("unknown sort order {0:?}, expected \"asc\" or \"desc\"")]
    UnknownSort(String),

    #[error("{0}")]
    Conflict(LifecycleError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ApiError::NotFound(id),
            other => ApiError::Store(other),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::Store(store) => store.into(),
            other => ApiError::Conflict(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidStatus(_) | ApiError::UnknownAction(_) | ApiError::UnknownSort(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Conflict(LifecycleError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ApiError::Conflict(_) | ApiError::Store(_) => {
                error!(error = %self, "PR API request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}

/// A tracked PR with its most recent change, as listed.
#[derive(Debug, Serialize)]
pub struct PrListItem {
    #[serde(flatten)]
    pub pr: TrackedPr,
    pub latest_change: Option<PrChange>,
}

/// A tracked PR with every recorded change, newest first.
#[derive(Debug, Serialize)]
pub struct PrWithChanges {
    #[serde(flatten)]
    pub pr: TrackedPr,
    pub changes: Vec<PrChange>,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub total: usize,
    #[serde(flatten)]
    pub by_status: BTreeMap<PrStatus, usize>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// A status name or `all`. Absent means all.
    pub status: Option<String>,
    /// `desc` (default) lists the most recently updated first, `asc` the least.
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub action: String,
}

fn status_filter(raw: Option<&str>) -> Result<Option<PrStatus>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => Ok(Some(s.parse()?)),
    }
}

/// Whether to list oldest first.
fn ascending(raw: Option<&str>) -> Result<bool, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(false),
        Some(s) if s.eq_ignore_ascii_case("desc") => Ok(false),
        Some(s) if s.eq_ignore_ascii_case("asc") => Ok(true),
        Some(s) => Err(ApiError::UnknownSort(s.to_string())),
    }
}

fn parse_action(action: &str) -> Result<Transition, ApiError> {
    match action {
        "dismiss" => Ok(Transition::Dismiss),
        "track" => Ok(Transition::Track),
        other => Err(ApiError::UnknownAction(other.to_string())),
    }
}

/// `GET /api/prs?status=&sort=`
///
/// Sorted by `updated_at`, most recent first unless `sort=asc`.
pub async fn list_prs_handler<H, N>(
    State(app_state): State<AppState<H, N>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PrListItem>>, ApiError>
where
    H: SourceHost + 'static,
    N: Notifier + 'static,
{
    let filter = status_filter(query.status.as_deref())?;
    let ascending = ascending(query.sort.as_deref())?;
    let store = app_state.tracker().store();

    let mut prs = store.list_tracked(filter)?;
    prs.sort_by(|a, b| {
        a.updated_at
            .cmp(&b.updated_at)
            .then(a.pr_number.cmp(&b.pr_number))
    });
    if !ascending {
        prs.reverse();
    }

    let items = prs
        .into_iter()
        .map(|pr| {
            let latest_change = store.last_change(pr.id)?;
            Ok(PrListItem { pr, latest_change })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    Ok(Json(items))
}

/// `GET /api/prs/{id}`
pub async fn get_pr_handler<H, N>(
    State(app_state): State<AppState<H, N>>,
    Path(id): Path<u64>,
) -> Result<Json<PrWithChanges>, ApiError>
where
    H: SourceHost + 'static,
    N: Notifier + 'static,
{
    let id = TrackedPrId(id);
    let store = app_state.tracker().store();
    let pr = store.get_tracked(id)?.ok_or(ApiError::NotFound(id))?;
    let mut changes = store.list_changes(id)?;
    changes.reverse();
    Ok(Json(PrWithChanges { pr, changes }))
}

/// `PATCH /api/prs/{id}` with `{"action": "dismiss" | "track"}`.
pub async fn update_pr_handler<H, N>(
    State(app_state): State<AppState<H, N>>,
    Path(id): Path<u64>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<TrackedPr>, ApiError>
where
    H: SourceHost + 'static,
    N: Notifier + 'static,
{
    let transition = parse_action(&request.action)?;
    let pr = app_state
        .tracker()
        .transition(TrackedPrId(id), transition)?;
    Ok(Json(pr))
}

/// `GET /api/stats`
pub async fn stats_handler<H, N>(
    State(app_state): State<AppState<H, N>>,
) -> Result<Json<Stats>, ApiError>
where
    H: SourceHost + 'static,
    N: Notifier + 'static,
{
    let by_status = app_state.tracker().store().count_by_status()?;
    Ok(Json(Stats {
        total: by_status.values().sum(),
        by_status,
    }))
}

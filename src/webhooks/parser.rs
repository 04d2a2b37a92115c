//! Parses `pull_request` webhook payloads.
//!
//! Only the fields the handler uses are read; everything else GitHub sends is
//! ignored, so new payload fields never break parsing.

use serde::Deserialize;
use thiserror::Error;

use crate::github::payload::RawPull;
use crate::types::Sha;

use super::events::{PrAction, PullRequestEvent};

/// The `X-GitHub-Event` value this service acts on.
pub const PULL_REQUEST_EVENT: &str = "pull_request";

#[derive(Debug, Error)]
pub enum ParseError {
    /// Not JSON, or missing a required field.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct RawPullRequestEvent {
    action: String,
    pull_request: RawPull,
    before: Option<String>,
    after: Option<String>,
    repository: Option<RawRepository>,
}

/// Parses the body of a `pull_request` delivery.
pub fn parse_pull_request_event(payload: &[u8]) -> Result<PullRequestEvent, ParseError> {
    let raw: RawPullRequestEvent = serde_json::from_slice(payload)?;
    Ok(PullRequestEvent {
        action: PrAction::from(raw.action.as_str()),
        pr: raw.pull_request.to_open_pr(),
        state: raw.pull_request.to_snapshot().state,
        before: raw.before.filter(|s| !s.is_empty()).map(Sha::new),
        after: raw.after.filter(|s| !s.is_empty()).map(Sha::new),
        repository: raw.repository.map(|r| r.full_name),
    })
}

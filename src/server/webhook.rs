//! Webhook endpoint handler.
//!
//! Accepts GitHub webhook deliveries, validates signatures, and applies
//! `pull_request` events to tracked PRs before answering. A failure while
//! applying answers 500 so that GitHub redelivers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::AppState;
use crate::github::SourceHost;
use crate::notify::Notifier;
use crate::types::DeliveryId;
use crate::webhooks::{
    HandlerError, PULL_REQUEST_EVENT, ParseError, SignatureError, handle_pull_request,
    parse_pull_request_event, verify_request,
};

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("invalid payload: {0}")]
    InvalidJson(#[from] ParseError),

    #[error("failed to process delivery: {0}")]
    Handler(#[from] HandlerError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            WebhookError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Headers:
///   - `X-GitHub-Event`: only `pull_request` is acted on
///   - `X-GitHub-Delivery`: delivery ID, used for logging
///   - `X-Hub-Signature-256`: required when a webhook secret is configured
/// - Body: JSON webhook payload
///
/// # Response
///
/// - 200 OK: applied, or ignored (other events, other repositories)
/// - 400 Bad Request: malformed `pull_request` payload
/// - 401 Unauthorized: missing or invalid signature
/// - 500 Internal Server Error: the delivery could not be applied
pub async fn webhook_handler<H, N>(
    State(app_state): State<AppState<H, N>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError>
where
    H: SourceHost + 'static,
    N: Notifier + 'static,
{
    let event_type = get_header(&headers, HEADER_EVENT);
    let delivery_id = DeliveryId::new(get_header(&headers, HEADER_DELIVERY).unwrap_or("unknown"));

    // Verify before parsing anything.
    if let Err(e) = verify_request(
        &body,
        get_header(&headers, HEADER_SIGNATURE),
        app_state.webhook_secret(),
    ) {
        warn!(delivery_id = %delivery_id, error = %e, "Rejected webhook delivery");
        return Err(e.into());
    }

    if event_type != Some(PULL_REQUEST_EVENT) {
        debug!(delivery_id = %delivery_id, event_type = ?event_type, "Ignoring webhook event");
        return Ok((StatusCode::OK, "Ignored"));
    }

    let event = parse_pull_request_event(&body).inspect_err(|e| {
        warn!(delivery_id = %delivery_id, error = %e, "Malformed pull_request payload");
    })?;

    if !event.is_for(app_state.repo()) {
        warn!(
            delivery_id = %delivery_id,
            repository = ?event.repository,
            "Ignoring delivery for another repository"
        );
        return Ok((StatusCode::OK, "Ignored"));
    }

    debug!(
        delivery_id = %delivery_id,
        pr = %event.pr.number,
        action = event.action.as_str(),
        "Received pull_request event"
    );

    match handle_pull_request(app_state.tracker(), &event).await {
        Ok(_) => Ok((StatusCode::OK, "OK")),
        Err(e) => {
            error!(
                delivery_id = %delivery_id,
                pr = %event.pr.number,
                error = %e,
                "Failed to apply webhook"
            );
            Err(e.into())
        }
    }
}

fn get_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

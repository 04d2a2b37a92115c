//! GitHub `pull_request` webhooks.
//!
//! - Signature verification (HMAC-SHA256)
//! - Payload parsing into [`PullRequestEvent`]
//! - The handler that applies an event to tracked PRs

pub mod events;
pub mod handlers;
pub mod parser;
pub mod signature;

pub use events::{PrAction, PullRequestEvent};
pub use handlers::{HandlerError, HandlerOutcome, handle_pull_request};
pub use parser::{PULL_REQUEST_EVENT, ParseError, parse_pull_request_event};
pub use signature::{
    SignatureError, compute_signature, format_signature_header, parse_signature_header,
    verify_request, verify_signature,
};

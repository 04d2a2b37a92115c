//! Read access to GitHub.
//!
//! [`SourceHost`] is the seam; [`OctocrabClient`] implements it over the REST
//! API with per-request timeouts and backoff for transient failures.

mod api;
mod client;
mod error;
mod host;
pub(crate) mod payload;
mod retry;

pub use api::PAGE_SIZE;
pub use client::{DEFAULT_REQUEST_TIMEOUT, OctocrabClient};
pub use error::{GitHubApiError, GitHubErrorKind};
pub use host::SourceHost;
pub use retry::{RetryConfig, retry_with_backoff};

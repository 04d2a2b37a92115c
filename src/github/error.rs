//! GitHub API error types.
//!
//! Errors are split into transient and permanent so the retry layer knows what
//! to try again:
//!
//! - **Transient**: 5xx, rate limits, timeouts and network failures.
//! - **Permanent**: everything else, including 404 and auth failures.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The kind of GitHub API error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubErrorKind {
    /// Safe to retry with backoff.
    Transient,

    /// Retrying will not help.
    Permanent,
}

impl GitHubErrorKind {
    pub fn is_retriable(&self) -> bool {
        matches!(self, GitHubErrorKind::Transient)
    }
}

/// A GitHub API error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct GitHubApiError {
    pub kind: GitHubErrorKind,

    /// The HTTP status code, if available.
    pub status_code: Option<u16>,

    pub message: String,

    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for GitHubApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "GitHub API error (HTTP {}): {}", code, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl GitHubApiError {
    pub fn permanent_without_source(message: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn transient_without_source(message: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::Transient,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// A request that did not complete within its deadline.
    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self::transient_without_source(format!(
            "{} timed out after {}s",
            operation,
            after.as_secs_f64()
        ))
    }

    /// A response body we could not make sense of.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::permanent_without_source(message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(404)
    }

    /// Categorizes an octocrab error by status code and message.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let status_code = status_code_of(&err);
        let message = err.to_string();
        Self {
            kind: classify(status_code, &message),
            status_code,
            message,
            source: Some(err),
        }
    }
}

/// Phrases GitHub uses for failures that resolve on their own.
const TRANSIENT_HINTS: &[&str] = &["try again", "server error"];

/// 403s carrying one of these are rate limiting, not a permission problem.
const RATE_LIMIT_HINTS: &[&str] = &["rate limit", "api rate", "abuse detection"];

/// Transport failures that never produced a status code.
const NETWORK_HINTS: &[&str] = &["timeout", "timed out", "connection", "network", "dns"];

fn mentions(message: &str, hints: &[&str]) -> bool {
    let lower = message.to_lowercase();
    hints.iter().any(|hint| lower.contains(hint))
}

/// Decides whether a failed request is worth retrying.
fn classify(status_code: Option<u16>, message: &str) -> GitHubErrorKind {
    let transient = mentions(message, TRANSIENT_HINTS)
        || match status_code {
            Some(429) => true,
            Some(403) => mentions(message, RATE_LIMIT_HINTS),
            Some(code) => (500..600).contains(&code),
            None => mentions(message, NETWORK_HINTS),
        };
    if transient {
        GitHubErrorKind::Transient
    } else {
        GitHubErrorKind::Permanent
    }
}

/// The HTTP status of an octocrab error.
///
/// API errors carry it directly. Other variants only mention it in their
/// rendered message (`status: 404 ...`), which is parsed on a best-effort
/// basis; a miss yields `None`.
fn status_code_of(err: &octocrab::Error) -> Option<u16> {
    if let octocrab::Error::GitHub { source, .. } = err {
        return Some(source.status_code.as_u16());
    }
    let rendered = err.to_string();
    let (_, rest) = rendered.split_once("status: ")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

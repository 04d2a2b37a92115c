//! Octocrab client wrapper scoped to the watched repository.

use std::future::Future;
use std::time::Duration;

use octocrab::Octocrab;

use crate::types::RepoId;

use super::error::GitHubApiError;
use super::retry::{RetryConfig, retry_with_backoff};

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A GitHub API client scoped to a specific repository.
///
/// Every request made through [`OctocrabClient::call`] is bounded by a
/// timeout and retried on transient failures.
#[derive(Clone)]
pub struct OctocrabClient {
    client: Octocrab,
    repo: RepoId,
    request_timeout: Duration,
    retry: RetryConfig,
}

impl OctocrabClient {
    pub fn new(client: Octocrab, repo: RepoId) -> Self {
        Self {
            client,
            repo,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig::DEFAULT,
        }
    }

    /// Creates a client authenticated with a personal access token.
    pub fn from_token(token: impl Into<String>, repo: RepoId) -> Result<Self, octocrab::Error> {
        let client = Octocrab::builder().personal_token(token.into()).build()?;
        Ok(Self::new(client, repo))
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn inner(&self) -> &Octocrab {
        &self.client
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    pub fn owner(&self) -> &str {
        &self.repo.owner
    }

    pub fn repo_name(&self) -> &str {
        &self.repo.repo
    }

    /// `/repos/{owner}/{repo}` followed by `suffix`.
    pub(crate) fn repo_route(&self, suffix: &str) -> String {
        format!("/repos/{}/{}{}", self.owner(), self.repo_name(), suffix)
    }

    /// Runs one API request with the client's deadline and retry budget.
    pub(crate) async fn call<T, F, Fut>(
        &self,
        operation_name: &'static str,
        mut request: F,
    ) -> Result<T, GitHubApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GitHubApiError>>,
    {
        let timeout = self.request_timeout;
        retry_with_backoff(self.retry, operation_name, move || {
            let fut = request();
            async move {
                tokio::time::timeout(timeout, fut)
                    .await
                    .map_err(|_| GitHubApiError::timeout(operation_name, timeout))?
            }
        })
        .await
    }
}

impl std::fmt::Debug for OctocrabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabClient")
            .field("repo", &self.repo)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

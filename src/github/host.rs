//! The read-only view of GitHub the watcher depends on.
//!
//! Everything the reconciler, the webhook handler and the ownership cache need
//! from GitHub goes through [`SourceHost`], so tests can drive them with an
//! in-memory fake instead of the network.

use std::future::Future;

use crate::types::{ChangedFile, OpenPr, PrDetails, PrNumber, PrSnapshot};

use super::error::GitHubApiError;

/// Queries against the watched repository.
///
/// Implementations are scoped to a single repository at construction.
pub trait SourceHost: Send + Sync {
    /// All open pull requests, across every page.
    fn list_open_prs(&self) -> impl Future<Output = Result<Vec<OpenPr>, GitHubApiError>> + Send;

    /// The authoritative current state of one PR.
    fn get_pr_state(
        &self,
        pr: PrNumber,
    ) -> impl Future<Output = Result<PrSnapshot, GitHubApiError>> + Send;

    /// Aggregate diff statistics of one PR.
    fn get_pr_details(
        &self,
        pr: PrNumber,
    ) -> impl Future<Output = Result<PrDetails, GitHubApiError>> + Send;

    /// Files changed by one PR, in GitHub's order.
    fn list_pr_files(
        &self,
        pr: PrNumber,
    ) -> impl Future<Output = Result<Vec<ChangedFile>, GitHubApiError>> + Send;

    /// Raw content of a file, or `None` if it does not exist.
    ///
    /// With no `git_ref` the repository's default branch is read.
    fn get_file_content(
        &self,
        path: &str,
        git_ref: Option<&str>,
    ) -> impl Future<Output = Result<Option<String>, GitHubApiError>> + Send;

    /// Files changed between two commits.
    fn compare_commits(
        &self,
        base: &str,
        head: &str,
    ) -> impl Future<Output = Result<Vec<ChangedFile>, GitHubApiError>> + Send;
}

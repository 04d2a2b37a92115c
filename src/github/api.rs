//! [`SourceHost`] over the GitHub REST API.
//!
//! Requests go through octocrab's raw `get` into the local wire structs in
//! [`super::payload`], which keeps us independent of octocrab's model types.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::types::{ChangedFile, OpenPr, PrDetails, PrNumber, PrSnapshot};

use super::client::OctocrabClient;
use super::error::GitHubApiError;
use super::host::SourceHost;
use super::payload::{RawComparison, RawContent, RawFile, RawPull};

/// GitHub's maximum page size.
pub const PAGE_SIZE: u32 = 100;

/// GitHub stops listing PR files after 3000 entries.
const MAX_FILE_PAGES: u32 = 30;

#[derive(Serialize)]
struct PageParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    per_page: u32,
    page: u32,
}

#[derive(Serialize)]
struct RefParams<'a> {
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    git_ref: Option<&'a str>,
}

impl OctocrabClient {
    /// Fetches every page of a list endpoint, stopping at the first short page.
    async fn get_all_pages<T>(
        &self,
        operation_name: &'static str,
        route: &str,
        state: Option<&str>,
        max_pages: Option<u32>,
    ) -> Result<Vec<T>, GitHubApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut page = 1u32;
        let mut all = Vec::new();

        loop {
            let params = PageParams {
                state,
                per_page: PAGE_SIZE,
                page,
            };
            let params = &params;
            let items: Vec<T> = self
                .call(operation_name, move || async move {
                    self.inner()
                        .get(route, Some(params))
                        .await
                        .map_err(GitHubApiError::from_octocrab)
                })
                .await?;

            let is_last_page = items.len() < PAGE_SIZE as usize;
            all.extend(items);

            if is_last_page || max_pages.is_some_and(|max| page >= max) {
                break;
            }
            page += 1;
        }

        Ok(all)
    }

    async fn get_pull(&self, pr: PrNumber) -> Result<RawPull, GitHubApiError> {
        let route = self.repo_route(&format!("/pulls/{}", pr.0));
        let route = route.as_str();
        self.call("get_pull", move || async move {
            self.inner()
                .get(route, None::<&()>)
                .await
                .map_err(GitHubApiError::from_octocrab)
        })
        .await
    }
}

impl SourceHost for OctocrabClient {
    #[instrument(skip(self), fields(repo = %self.repo()))]
    async fn list_open_prs(&self) -> Result<Vec<OpenPr>, GitHubApiError> {
        let route = self.repo_route("/pulls");
        let pulls: Vec<RawPull> = self
            .get_all_pages("list_open_prs", &route, Some("open"), None)
            .await?;
        debug!(count = pulls.len(), "Listed open PRs");
        Ok(pulls.iter().map(RawPull::to_open_pr).collect())
    }

    #[instrument(skip(self), fields(repo = %self.repo()))]
    async fn get_pr_state(&self, pr: PrNumber) -> Result<PrSnapshot, GitHubApiError> {
        Ok(self.get_pull(pr).await?.to_snapshot())
    }

    #[instrument(skip(self), fields(repo = %self.repo()))]
    async fn get_pr_details(&self, pr: PrNumber) -> Result<PrDetails, GitHubApiError> {
        Ok(self.get_pull(pr).await?.to_details())
    }

    #[instrument(skip(self), fields(repo = %self.repo()))]
    async fn list_pr_files(&self, pr: PrNumber) -> Result<Vec<ChangedFile>, GitHubApiError> {
        let route = self.repo_route(&format!("/pulls/{}/files", pr.0));
        let files: Vec<RawFile> = self
            .get_all_pages("list_pr_files", &route, None, Some(MAX_FILE_PAGES))
            .await?;
        Ok(files.into_iter().map(ChangedFile::from).collect())
    }

    #[instrument(skip(self), fields(repo = %self.repo()))]
    async fn get_file_content(
        &self,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<String>, GitHubApiError> {
        let route = self.repo_route(&format!("/contents/{}", path.trim_start_matches('/')));
        let (route, params) = (route.as_str(), &RefParams { git_ref });
        let result: Result<RawContent, _> = self
            .call("get_file_content", move || async move {
                self.inner()
                    .get(route, Some(params))
                    .await
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await;

        let content = match result {
            Ok(content) => content,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        decode_content(path, content).map(Some)
    }

    #[instrument(skip(self), fields(repo = %self.repo()))]
    async fn compare_commits(
        &self,
        base: &str,
        head: &str,
    ) -> Result<Vec<ChangedFile>, GitHubApiError> {
        let route = self.repo_route(&format!("/compare/{}...{}", base, head));
        let route = route.as_str();
        let comparison: RawComparison = self
            .call("compare_commits", move || async move {
                self.inner()
                    .get(route, None::<&()>)
                    .await
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await?;
        Ok(comparison.files.into_iter().map(ChangedFile::from).collect())
    }
}

/// Decodes a contents-API response into text.
fn decode_content(path: &str, content: RawContent) -> Result<String, GitHubApiError> {
    let Some(body) = content.content else {
        // Directories and oversized files come back without inline content.
        return Err(GitHubApiError::malformed(format!(
            "{} has no inline content",
            path
        )));
    };

    match content.encoding.as_deref() {
        Some("base64") | None => {
            // GitHub wraps the base64 payload at 60 columns.
            let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = BASE64.decode(compact).map_err(|e| {
                GitHubApiError::malformed(format!("{} is not valid base64: {}", path, e))
            })?;
            String::from_utf8(bytes)
                .map_err(|_| GitHubApiError::malformed(format!("{} is not UTF-8", path)))
        }
        Some(_) => Ok(body),
    }
}

//! PR Watch - tracks the pull requests of one GitHub repository that a team
//! cares about and reports what happens to them.
//!
//! A PR is interesting when its title or body mentions a configured keyword,
//! or when it touches files a configured team owns. Interesting PRs are
//! tracked from discovery until they are merged, closed or dismissed, and
//! each new head commit is recorded once with a summary of the diff.
//!
//! Two triggers feed the same [`lifecycle::Tracker`]:
//! - the [`reconcile`] loop, which polls the repository on an interval
//! - the [`server`]'s webhook endpoint, which applies `pull_request`
//!   deliveries as they arrive

pub mod config;
pub mod github;
pub mod interest;
pub mod lifecycle;
pub mod notify;
pub mod reconcile;
pub mod server;
pub mod store;
pub mod summary;
pub mod types;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod test_utils;

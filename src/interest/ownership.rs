//! Per-team cache of owned path globs.
//!
//! Ownership files change rarely, so each team's patterns are kept for an hour
//! before the file is fetched again. Failed fetches are never cached: the next
//! lookup retries straight away.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::TeamInterest;
use crate::github::SourceHost;

use super::matcher::TeamPaths;
use super::tree::OwnershipTree;

/// How long fetched patterns stay fresh.
pub const OWNERSHIP_TTL: Duration = Duration::from_secs(60 * 60);

/// Owned globs for every configured team, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedTeams {
    pub teams: Vec<TeamPaths>,
    /// Teams whose ownership file could not be read. Their `patterns` are
    /// empty for this lookup only.
    pub unavailable: Vec<String>,
}

impl ResolvedTeams {
    /// Whether every team's patterns came from a readable file.
    pub fn is_complete(&self) -> bool {
        self.unavailable.is_empty()
    }
}

#[derive(Debug, Clone)]
struct CachedPaths {
    patterns: Vec<String>,
    fetched_at: Instant,
}

/// Team name → owned globs, refreshed lazily.
///
/// The lock is only held to read or replace an entry, never across a fetch, so
/// two concurrent refreshes of one team both fetch and the later write wins.
#[derive(Debug)]
pub struct OwnershipCache {
    ttl: Duration,
    /// Ref ownership files are read at; `None` for the default branch.
    git_ref: Option<String>,
    entries: RwLock<HashMap<String, CachedPaths>>,
}

impl OwnershipCache {
    pub fn new(git_ref: Option<String>) -> Self {
        Self::with_ttl(git_ref, OWNERSHIP_TTL)
    }

    pub fn with_ttl(git_ref: Option<String>, ttl: Duration) -> Self {
        Self {
            ttl,
            git_ref,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The team's owned globs. Empty if the ownership file could not be read.
    pub async fn resolve_owned_paths<H: SourceHost>(
        &self,
        host: &H,
        team: &TeamInterest,
    ) -> Vec<String> {
        self.resolve_at(host, team, Instant::now())
            .await
            .unwrap_or_default()
    }

    /// Resolves every team concurrently.
    pub async fn resolve_all<H: SourceHost>(
        &self,
        host: &H,
        teams: &[TeamInterest],
    ) -> ResolvedTeams {
        let now = Instant::now();
        let resolved = join_all(teams.iter().map(|team| self.resolve_at(host, team, now))).await;

        let mut out = ResolvedTeams::default();
        for (team, patterns) in teams.iter().zip(resolved) {
            if patterns.is_none() {
                out.unavailable.push(team.name.clone());
            }
            out.teams.push(TeamPaths {
                team: team.name.clone(),
                patterns: patterns.unwrap_or_default(),
            });
        }
        out
    }

    /// `None` if the team's file could not be read.
    async fn resolve_at<H: SourceHost>(
        &self,
        host: &H,
        team: &TeamInterest,
        now: Instant,
    ) -> Option<Vec<String>> {
        if let Some(cached) = self.entries.read().await.get(&team.name)
            && now.saturating_duration_since(cached.fetched_at) < self.ttl
        {
            return Some(cached.patterns.clone());
        }

        let patterns = self.fetch(host, team).await?;

        debug!(team = %team.name, count = patterns.len(), "Refreshed owned paths");
        self.entries.write().await.insert(
            team.name.clone(),
            CachedPaths {
                patterns: patterns.clone(),
                fetched_at: now,
            },
        );
        Some(patterns)
    }

    /// Reads and parses the ownership file. `None` on any failure.
    async fn fetch<H: SourceHost>(&self, host: &H, team: &TeamInterest) -> Option<Vec<String>> {
        let content = match host
            .get_file_content(&team.ownership_file, self.git_ref.as_deref())
            .await
        {
            Ok(Some(content)) => content,
            Ok(None) => {
                warn!(team = %team.name, file = %team.ownership_file, "Ownership file not found");
                return None;
            }
            Err(e) => {
                warn!(team = %team.name, file = %team.ownership_file, error = %e, "Could not fetch ownership file");
                return None;
            }
        };

        match OwnershipTree::parse(&content) {
            Ok(tree) => Some(tree.patterns()),
            Err(e) => {
                warn!(team = %team.name, file = %team.ownership_file, error = %e, "Could not parse ownership file");
                None
            }
        }
    }
}

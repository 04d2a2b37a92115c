//! Deciding whether a PR is interesting.
//!
//! Pure: owned paths are resolved by the caller (see [`super::OwnershipCache`])
//! and passed in, so the same inputs always give the same result.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::warn;

use crate::types::{ChangedFile, MatchDetails, MatchReason, TeamMatch};

/// A team's resolved ownership globs, in ownership-file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamPaths {
    pub team: String,
    pub patterns: Vec<String>,
}

/// What the matcher looks at.
#[derive(Debug, Clone, Copy)]
pub struct MatchInput<'a> {
    pub title: &'a str,
    pub body: Option<&'a str>,
    pub branch: &'a str,
    pub files: &'a [ChangedFile],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub is_interesting: bool,
    pub reason: MatchReason,
    pub details: MatchDetails,
}

pub fn evaluate(input: &MatchInput<'_>, keywords: &[String], owned: &[TeamPaths]) -> MatchResult {
    let matched_keywords = keyword_matches(input, keywords);
    let matched_teams = ownership_matches(input.files, owned);

    let reason = MatchReason::classify(!matched_keywords.is_empty(), !matched_teams.is_empty());

    MatchResult {
        is_interesting: reason != MatchReason::None,
        reason,
        details: MatchDetails {
            matched_keywords,
            matched_teams,
        },
    }
}

/// Keywords present anywhere in the title, body, branch or filenames,
/// case-insensitively, in configuration order.
fn keyword_matches(input: &MatchInput<'_>, keywords: &[String]) -> Vec<String> {
    let haystack = [input.title, input.body.unwrap_or(""), input.branch]
        .into_iter()
        .chain(input.files.iter().map(|f| f.filename.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    keywords
        .iter()
        .filter(|kw| haystack.contains(&kw.to_lowercase()))
        .cloned()
        .collect()
}

fn ownership_matches(files: &[ChangedFile], owned: &[TeamPaths]) -> Vec<TeamMatch> {
    owned
        .iter()
        .filter(|team| !team.patterns.is_empty())
        .filter_map(|team| {
            let globs = compile(team)?;
            let matched: Vec<String> = files
                .iter()
                .filter(|f| globs.is_match(&f.filename))
                .map(|f| f.filename.clone())
                .collect();
            (!matched.is_empty()).then(|| TeamMatch {
                team: team.team.clone(),
                files: matched,
            })
        })
        .collect()
}

/// Compiles a team's patterns. `*` stays within a path segment, `**` spans
/// segments, and dotfiles match like any other file. Invalid patterns are
/// skipped; `None` if nothing compiled.
fn compile(team: &TeamPaths) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let mut any = false;
    for pattern in &team.patterns {
        match GlobBuilder::new(pattern).literal_separator(true).build() {
            Ok(glob) => {
                builder.add(glob);
                any = true;
            }
            Err(e) => warn!(team = %team.team, pattern = %pattern, error = %e, "Skipping invalid ownership pattern"),
        }
    }
    if !any {
        return None;
    }
    match builder.build() {
        Ok(set) => Some(set),
        Err(e) => {
            warn!(team = %team.team, error = %e, "Could not build ownership matcher");
            None
        }
    }
}

//! Which pull requests are worth watching.
//!
//! A PR is interesting if it mentions a configured keyword or touches a path
//! owned by a configured team.

pub mod matcher;
pub mod ownership;
pub mod tree;

pub use matcher::{MatchInput, MatchResult, TeamPaths, evaluate};
pub use ownership::{OWNERSHIP_TTL, OwnershipCache, ResolvedTeams};
pub use tree::OwnershipTree;

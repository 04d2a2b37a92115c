//! Polling configuration for the reconciliation loop.
//!
//! Webhooks are the fast path, but they get dropped: downtime, redelivery
//! limits, a PR opened before the hook was installed. The loop lists open PRs
//! on a fixed interval and repairs whatever the webhooks missed.
//!
//! # Per-cycle caps
//!
//! - **New PRs evaluated**: 5. Evaluation costs a file listing plus ownership
//!   lookups, so a burst of new PRs is spread over several cycles.
//! - **Tracked PRs deep-checked**: 10, taken round-robin. Every open tracked
//!   PR is checked at least once every ⌈open / 10⌉ cycles.

use std::time::Duration;

use crate::config::{DEFAULT_POLL_INTERVAL, WatchConfig};

/// PRs evaluated for interest per cycle.
pub const MAX_NEW_PRS_PER_CYCLE: usize = 5;

/// Tracked PRs whose head is compared per cycle.
pub const MAX_TRACKED_CHECKS_PER_CYCLE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between cycle starts.
    pub interval: Duration,

    pub max_new_prs_per_cycle: usize,

    pub max_tracked_checks_per_cycle: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PollConfig {
    pub fn new() -> Self {
        PollConfig {
            interval: DEFAULT_POLL_INTERVAL,
            max_new_prs_per_cycle: MAX_NEW_PRS_PER_CYCLE,
            max_tracked_checks_per_cycle: MAX_TRACKED_CHECKS_PER_CYCLE,
        }
    }

    /// Takes the interval from the loaded config (env overrides included).
    pub fn from_config(config: &WatchConfig) -> Self {
        PollConfig {
            interval: config.poll_interval,
            ..Self::new()
        }
    }

    /// Cycles needed to deep-check `open` tracked PRs at least once each.
    pub fn cycles_to_cover(&self, open: usize) -> usize {
        open.div_ceil(self.max_tracked_checks_per_cycle.max(1))
    }
}

//! Periodic reconciliation against GitHub.
//!
//! The loop is the slow, thorough counterpart of the webhook handler: it
//! discovers PRs nobody told us about, notices closures and pushes the
//! webhooks missed, and keeps reviewer lists current.

pub mod cycle;
pub mod poll;
pub mod runner;

pub use cycle::{CycleReport, Reconciler};
pub use poll::{MAX_NEW_PRS_PER_CYCLE, MAX_TRACKED_CHECKS_PER_CYCLE, PollConfig};
pub use runner::{ReconcileHandle, ReconcileService};

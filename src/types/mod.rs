//! Core domain types for the PR watcher.

pub mod ids;
pub mod pr;
pub mod tracked;

pub use ids::{ChangeId, DeliveryId, PrNumber, RepoId, Sha, TrackedPrId};
pub use pr::{ChangedFile, OpenPr, PrDetails, PrSnapshot, PrState};
pub use tracked::{
    MatchDetails, MatchReason, NewPrChange, NewTrackedPr, PrChange, PrStatus, TeamMatch,
    TrackedPr,
};

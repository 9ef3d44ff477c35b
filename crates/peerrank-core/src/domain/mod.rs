//! Domain models for PeerRank.
//!
//! Canonical definitions for the core entities:
//! - `Paper` / `PaperCatalog`: the papers reviews are written about
//! - `Review` / `Grade`: immutable source review records
//! - `Submission` / `SubmissionStore`: one epoch's collected reviews
//! - `Rubric` / `RubricScore`: multi-criterion scoring
//! - `RankedGroup` / `GroupPayout` / `RewardVector`: ranking and rewards

pub mod error;
pub mod fingerprint;
pub mod paper;
pub mod review;
pub mod reward;
pub mod rubric;
pub mod submission;

// Re-export main types and errors
pub use error::{ConfigError, PeerRankError, Result};
pub use fingerprint::Fingerprint;
pub use paper::{Paper, PaperCatalog};
pub use review::{Grade, Review};
pub use reward::{GroupPayout, RankedGroup, RewardVector, ScoredSubmission};
pub use rubric::{Criterion, CriterionScores, Rubric, RubricScore};
pub use submission::{
    DispatchRequest, DispatchResponse, DroppedSubmission, ResponseRejection, Submission,
    SubmissionStore,
};

//! PeerRank Core Library
//!
//! The validator reward pipeline: dispatch review requests to participants,
//! group the replies by paper, score them against a rubric, rank each group
//! into rank-decayed rewards and fold those into a persistent EMA ledger.
//!
//! ## Layer 1 - Pipeline
//!
//! Everything here is transport-agnostic. Participants, the rubric
//! evaluator, the score cache, the ledger store and the weight publisher are
//! traits injected into [`EpochScheduler`].

pub mod config;
pub mod dataset;
pub mod dispatch;
pub mod domain;
pub mod fakes;
pub mod grouper;
pub mod ledger;
pub mod metrics;
pub mod obs;
pub mod publish;
pub mod ranker;
pub mod scheduler;
pub mod scoring;
pub mod telemetry;

pub use config::{
    DispatchConfig, LedgerConfig, NonResponsePolicy, RewardConfig, ScheduleConfig,
    ScoringConfig, SingleEntryPolicy, ValidatorConfig,
};

pub use domain::{
    ConfigError, Criterion, CriterionScores, DispatchRequest, DispatchResponse,
    DroppedSubmission, Fingerprint, Grade, GroupPayout, Paper, PaperCatalog, PeerRankError,
    RankedGroup, ResponseRejection, Result, Review, RewardVector, Rubric, RubricScore,
    ScoredSubmission, Submission, SubmissionStore,
};

pub use dataset::{
    load_assignments, load_catalog, summarize, AssignmentSummary, DatasetParticipantClient,
    DatasetSummary, ReviewDataset,
};
pub use dispatch::{DispatchOutcome, Dispatcher, ParticipantClient};
pub use grouper::group_by_paper;
pub use ledger::{ema_update, LedgerUpdate, ScoreLedger};
pub use publish::{JsonFileWeightPublisher, TracingPublisher, WeightPublisher};
pub use ranker::{compare_entries, distribute, rank_group, rank_weights};
pub use scheduler::{EpochReport, EpochScheduler, EpochStage, PipelineDeps};
pub use scoring::{
    EvaluatorError, FsScoreCache, MemoryScoreCache, RubricEvaluator, RubricScorer, ScoreCache,
};

pub use peerrank_state::{
    FileLedgerStore, LedgerSnapshot, LedgerStore, ParticipantId, ParticipantScoreState,
};

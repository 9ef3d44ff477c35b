//! Rubric scoring: the evaluator seam, score caches and the scorer.

pub mod cache;
pub mod evaluator;
pub mod fs_cache;
pub mod scorer;

pub use cache::{MemoryScoreCache, ScoreCache};
pub use evaluator::{EvaluatorError, RubricEvaluator};
pub use fs_cache::FsScoreCache;
pub use scorer::RubricScorer;

//! The external rubric evaluator boundary.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{CriterionScores, Rubric};

/// Failures of a single evaluator call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluatorError {
    #[error("evaluator call timed out after {0:?}")]
    Timeout(Duration),

    #[error("evaluator rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("evaluator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed evaluator reply: {0}")]
    Malformed(String),

    #[error("evaluator unavailable: {0}")]
    Unavailable(String),
}

impl EvaluatorError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Client errors and malformed replies are permanent: the same request
    /// would fail the same way.
    pub fn is_retryable(&self) -> bool {
        match self {
            EvaluatorError::Timeout(_)
            | EvaluatorError::RateLimited { .. }
            | EvaluatorError::Transport(_)
            | EvaluatorError::Unavailable(_) => true,
            EvaluatorError::Status { status, .. } => *status >= 500,
            EvaluatorError::Malformed(_) => false,
        }
    }
}

/// Scores one review text against a rubric.
///
/// Implementations return raw per-criterion scores; range checks and
/// aggregation happen in [`Rubric::assess`]. Calls must be idempotent so the
/// scorer can retry them.
#[async_trait]
pub trait RubricEvaluator: Send + Sync {
    /// Short name used in logs (model or backend name).
    fn name(&self) -> &str;

    async fn evaluate(
        &self,
        review_text: &str,
        rubric: &Rubric,
    ) -> Result<CriterionScores, EvaluatorError>;
}

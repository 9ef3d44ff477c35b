//! Deterministic fakes for the pipeline's external seams (testing only)
//!
//! - `ScriptedParticipants`: per-participant replies, latency and failures
//! - `FixedEvaluator`: canned rubric scores with call counting and outages

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use peerrank_state::ParticipantId;

use crate::dispatch::ParticipantClient;
use crate::domain::{CriterionScores, DispatchRequest, DispatchResponse, Review, Rubric};
use crate::scoring::{EvaluatorError, RubricEvaluator};

/// Every criterion of `rubric` set to `value`.
pub fn uniform_scores(rubric: &Rubric, value: f64) -> CriterionScores {
    rubric
        .criterion_names()
        .map(|n| (n.to_string(), value))
        .collect()
}

// ---------------------------------------------------------------------------
// ScriptedParticipants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Script {
    Reply {
        response: DispatchResponse,
        delay: Duration,
    },
    Silent,
    Fail,
}

/// Participants answering from a script. Unscripted ids reply with nothing.
#[derive(Debug, Default)]
pub struct ScriptedParticipants {
    scripts: BTreeMap<ParticipantId, Script>,
    requests: AtomicUsize,
}

impl ScriptedParticipants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply immediately with a review of `paper_id`.
    pub fn reply(self, participant: &str, paper_id: &str, text: &str) -> Self {
        self.reply_after(participant, paper_id, text, Duration::ZERO)
    }

    /// Reply with a review of `paper_id` after `delay`.
    pub fn reply_after(
        self,
        participant: &str,
        paper_id: &str,
        text: &str,
        delay: Duration,
    ) -> Self {
        let review = Review::new(paper_id, text);
        self.respond_with(participant, review, delay)
    }

    /// Reply with an arbitrary review after `delay`.
    pub fn respond_with(mut self, participant: &str, review: Review, delay: Duration) -> Self {
        let response = DispatchResponse {
            participant_id: participant.to_string(),
            paper_id: Some(review.paper_id),
            review_id: Some(review.review_id),
            review_text: Some(review.review_text),
            rating: review.rating,
            confidence: review.confidence,
            reviewer_id: Some(review.reviewer_id),
            metadata: review.metadata,
        };
        self.scripts
            .insert(ParticipantId::new(participant), Script::Reply { response, delay });
        self
    }

    /// Reply with a raw response, e.g. one that fails shape checks.
    pub fn raw(mut self, participant: &str, response: DispatchResponse) -> Self {
        self.scripts.insert(
            ParticipantId::new(participant),
            Script::Reply {
                response,
                delay: Duration::ZERO,
            },
        );
        self
    }

    /// Never answer.
    pub fn silent(mut self, participant: &str) -> Self {
        self.scripts
            .insert(ParticipantId::new(participant), Script::Silent);
        self
    }

    /// Fail at the transport level.
    pub fn failing(mut self, participant: &str) -> Self {
        self.scripts
            .insert(ParticipantId::new(participant), Script::Fail);
        self
    }

    /// Every scripted participant id.
    pub fn population(&self) -> Vec<ParticipantId> {
        self.scripts.keys().cloned().collect()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParticipantClient for ScriptedParticipants {
    async fn request_review(
        &self,
        participant: &ParticipantId,
        _request: &DispatchRequest,
    ) -> anyhow::Result<Option<DispatchResponse>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match self.scripts.get(participant).cloned() {
            None => Ok(None),
            Some(Script::Reply { response, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(Some(response))
            }
            Some(Script::Silent) => {
                std::future::pending::<()>().await;
                Ok(None)
            }
            Some(Script::Fail) => anyhow::bail!("connection refused"),
        }
    }
}

// ---------------------------------------------------------------------------
// FixedEvaluator
// ---------------------------------------------------------------------------

/// Evaluator returning canned scores.
///
/// Scores come from a per-text table, falling back to a default. Failures
/// can be scripted for the first `n` calls or for every call.
#[derive(Debug)]
pub struct FixedEvaluator {
    name: String,
    default: CriterionScores,
    by_text: HashMap<String, CriterionScores>,
    calls: AtomicUsize,
    fail_first: usize,
    always_fail: Option<EvaluatorError>,
    delay: Duration,
}

impl FixedEvaluator {
    pub fn new(default: CriterionScores) -> Self {
        Self {
            name: "fixed".to_string(),
            default,
            by_text: HashMap::new(),
            calls: AtomicUsize::new(0),
            fail_first: 0,
            always_fail: None,
            delay: Duration::ZERO,
        }
    }

    /// Report `name` as the evaluator (model) name.
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Scores for one specific review text.
    pub fn with_text(mut self, text: &str, scores: CriterionScores) -> Self {
        self.by_text.insert(text.to_string(), scores);
        self
    }

    /// The first `n` calls fail with a retryable error.
    pub fn fail_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// Every call fails with `error`.
    pub fn failing_with(mut self, error: EvaluatorError) -> Self {
        self.always_fail = Some(error);
        self
    }

    /// Every call fails with a retryable outage.
    pub fn failing(self) -> Self {
        self.failing_with(EvaluatorError::Unavailable("scripted outage".to_string()))
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RubricEvaluator for FixedEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &self,
        review_text: &str,
        _rubric: &Rubric,
    ) -> Result<CriterionScores, EvaluatorError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = &self.always_fail {
            return Err(err.clone());
        }
        if n < self.fail_first {
            return Err(EvaluatorError::Unavailable(format!("scripted failure {}", n + 1)));
        }
        Ok(self
            .by_text
            .get(review_text)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

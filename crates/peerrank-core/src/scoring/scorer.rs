//! Per-submission rubric scoring with caching, retries and a shared deadline.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::cache::ScoreCache;
use super::evaluator::{EvaluatorError, RubricEvaluator};
use crate::config::ScoringConfig;
use crate::domain::{
    CriterionScores, Fingerprint, Rubric, RubricScore, ScoredSubmission, Submission,
};
use crate::metrics::METRICS;

/// Scores review texts against one fixed rubric.
///
/// Failures never escape: a submission whose evaluation fails, times out or
/// returns out-of-range scores gets an invalid [`RubricScore`]. Only scores
/// the evaluator actually produced are cached; transport failures are not.
pub struct RubricScorer {
    evaluator: Arc<dyn RubricEvaluator>,
    cache: Arc<dyn ScoreCache>,
    rubric: Arc<Rubric>,
    rubric_fp: Fingerprint,
    config: ScoringConfig,
}

impl RubricScorer {
    pub fn new(
        evaluator: Arc<dyn RubricEvaluator>,
        cache: Arc<dyn ScoreCache>,
        rubric: Rubric,
        config: ScoringConfig,
    ) -> Self {
        let rubric_fp = rubric.fingerprint();
        Self {
            evaluator,
            cache,
            rubric: Arc::new(rubric),
            rubric_fp,
            config,
        }
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// Cache key of a review text under this scorer's rubric and
    /// evaluator. Scores from one model are never served for another.
    pub fn fingerprint(&self, review_text: &str) -> Fingerprint {
        Fingerprint::of_review(&self.rubric_fp, self.evaluator.name(), review_text)
    }

    /// Score one submission.
    pub async fn score(&self, submission: &Submission) -> RubricScore {
        let text = &submission.review.review_text;
        self.score_text(self.fingerprint(text), text).await
    }

    async fn score_text(&self, fingerprint: Fingerprint, text: &str) -> RubricScore {
        if let Some(hit) = self.cache.get(&fingerprint).await {
            METRICS.inc_cache_hits();
            debug!(event = "score.cache_hit", fingerprint = %fingerprint.short());
            return hit;
        }
        METRICS.inc_cache_misses();
        debug!(event = "score.cache_miss", fingerprint = %fingerprint.short());

        match self.evaluate_with_retry(text).await {
            Ok(raw) => {
                let score = self.rubric.assess(fingerprint, &raw);
                if let Some(reason) = &score.rejection {
                    warn!(
                        event = "score.rejected",
                        fingerprint = %fingerprint.short(),
                        reason = %reason,
                    );
                }
                self.cache.insert(score).await
            }
            Err(e) => {
                METRICS.inc_evaluator_failures();
                warn!(
                    event = "score.evaluator_failed",
                    evaluator = %self.evaluator.name(),
                    fingerprint = %fingerprint.short(),
                    error = %e,
                );
                RubricScore::rejected(fingerprint, format!("evaluator failed: {e}"))
            }
        }
    }

    async fn evaluate_with_retry(&self, text: &str) -> Result<CriterionScores, EvaluatorError> {
        let call_timeout = self.config.call_timeout();
        let mut attempt = 0;
        loop {
            METRICS.inc_evaluator_calls();
            let call = self.evaluator.evaluate(text, &self.rubric);
            let result = match tokio::time::timeout(call_timeout, call).await {
                Ok(r) => r,
                Err(_) => Err(EvaluatorError::Timeout(call_timeout)),
            };

            match result {
                Ok(scores) => return Ok(scores),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let mut delay = self.config.backoff(attempt);
                    if let EvaluatorError::RateLimited {
                        retry_after: Some(after),
                    } = &e
                    {
                        delay = delay.max(*after);
                    }
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying evaluator call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Score a batch, returned in input order.
    ///
    /// Identical texts are evaluated once. At most
    /// `scoring.max_concurrent` evaluations run at a time; any still
    /// outstanding at `deadline` are abandoned and scored invalid.
    pub async fn score_all(
        &self,
        submissions: Vec<Submission>,
        deadline: Instant,
    ) -> Vec<ScoredSubmission> {
        let fingerprints: Vec<Fingerprint> = submissions
            .iter()
            .map(|s| self.fingerprint(&s.review.review_text))
            .collect();

        let mut unique: HashMap<Fingerprint, &str> = HashMap::new();
        for (fp, s) in fingerprints.iter().zip(&submissions) {
            unique.entry(*fp).or_insert(s.review.review_text.as_str());
        }

        let scores: HashMap<Fingerprint, RubricScore> = stream::iter(unique)
            .map(|(fp, text)| async move {
                let scoring = tokio::time::timeout_at(deadline, self.score_text(fp, text));
                let score = match scoring.await {
                    Ok(score) => score,
                    Err(_) => {
                        METRICS.inc_evaluator_failures();
                        warn!(event = "score.deadline_exceeded", fingerprint = %fp.short());
                        RubricScore::rejected(fp, "epoch deadline exceeded")
                    }
                };
                (fp, score)
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        submissions
            .into_iter()
            .zip(fingerprints)
            .map(|(submission, fp)| {
                let score = scores
                    .get(&fp)
                    .cloned()
                    .unwrap_or_else(|| RubricScore::rejected(fp, "not scored"));
                ScoredSubmission { submission, score }
            })
            .collect()
    }

    /// Score every paper-group, preserving group membership.
    pub async fn score_groups(
        &self,
        groups: BTreeMap<String, Vec<Submission>>,
        deadline: Instant,
    ) -> BTreeMap<String, Vec<ScoredSubmission>> {
        let mut sizes = Vec::with_capacity(groups.len());
        let mut flat = Vec::new();
        for (paper_id, submissions) in groups {
            sizes.push((paper_id, submissions.len()));
            flat.extend(submissions);
        }

        let mut scored = self.score_all(flat, deadline).await.into_iter();
        sizes
            .into_iter()
            .map(|(paper_id, n)| (paper_id, scored.by_ref().take(n).collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Review;
    use crate::fakes::{uniform_scores, FixedEvaluator};
    use crate::scoring::MemoryScoreCache;
    use peerrank_state::ParticipantId;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn rubric() -> Rubric {
        Rubric::uniform(&["clarity", "rigor"], 0.0, 10.0)
    }

    fn submission(participant: &str, text: &str) -> Submission {
        Submission {
            participant: ParticipantId::new(participant),
            review: Review::new("p1", text),
        }
    }

    fn scorer(evaluator: Arc<FixedEvaluator>, config: ScoringConfig) -> RubricScorer {
        RubricScorer::new(evaluator, Arc::new(MemoryScoreCache::new()), rubric(), config)
    }

    fn fast_config() -> ScoringConfig {
        ScoringConfig {
            backoff_base_ms: 10,
            call_timeout_ms: 1_000,
            ..ScoringConfig::default()
        }
    }

    #[tokio::test]
    async fn test_valid_score_is_cached() {
        let rubric = rubric();
        let evaluator = Arc::new(FixedEvaluator::new(uniform_scores(&rubric, 7.0)));
        let scorer = scorer(evaluator.clone(), fast_config());

        let first = scorer.score(&submission("a", "same text")).await;
        let second = scorer.score(&submission("b", "same text")).await;

        assert!(first.valid);
        assert!((first.aggregate - 7.0).abs() < 1e-9);
        assert_eq!(first, second);
        assert_eq!(evaluator.calls(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_cache_hits_logged_distinctly() {
        let rubric = rubric();
        let evaluator = Arc::new(FixedEvaluator::new(uniform_scores(&rubric, 4.0)));
        let scorer = scorer(evaluator, fast_config());

        scorer.score(&submission("a", "logged")).await;
        assert!(logs_contain("score.cache_miss"));
        assert!(!logs_contain("score.cache_hit"));

        scorer.score(&submission("b", "logged")).await;
        assert!(logs_contain("score.cache_hit"));
    }

    #[tokio::test]
    async fn test_cache_entries_are_scoped_to_the_evaluator_model() {
        let rubric = rubric();
        let cache: Arc<dyn ScoreCache> = Arc::new(MemoryScoreCache::new());
        let mini =
            Arc::new(FixedEvaluator::new(uniform_scores(&rubric, 1.0)).named("gpt-4.1-mini"));
        let large = Arc::new(FixedEvaluator::new(uniform_scores(&rubric, 4.0)).named("gpt-4o"));
        let scorer_mini =
            RubricScorer::new(mini.clone(), Arc::clone(&cache), rubric.clone(), fast_config());
        let scorer_large =
            RubricScorer::new(large.clone(), Arc::clone(&cache), rubric.clone(), fast_config());

        let text = "the same review";
        assert_ne!(scorer_mini.fingerprint(text), scorer_large.fingerprint(text));

        let a = scorer_mini.score(&submission("a", text)).await;
        let b = scorer_large.score(&submission("a", text)).await;
        assert!((a.aggregate - 1.0).abs() < 1e-9);
        assert!((b.aggregate - 4.0).abs() < 1e-9);
        assert_eq!(mini.calls(), 1);
        assert_eq!(large.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let rubric = rubric();
        let evaluator = Arc::new(FixedEvaluator::new(uniform_scores(&rubric, 5.0)).fail_first(2));
        let scorer = scorer(evaluator.clone(), fast_config());

        let score = scorer.score(&submission("a", "flaky")).await;
        assert!(score.valid);
        assert_eq!(evaluator.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_invalid_and_not_cached() {
        let rubric = rubric();
        let evaluator = Arc::new(FixedEvaluator::new(uniform_scores(&rubric, 5.0)).fail_first(3));
        let scorer = scorer(evaluator.clone(), fast_config());

        let failed = scorer.score(&submission("a", "down")).await;
        assert!(!failed.valid);
        assert_eq!(failed.aggregate, 0.0);
        assert_eq!(evaluator.calls(), 3);

        // The outage is over; the failure was not cached.
        let recovered = scorer.score(&submission("a", "down")).await;
        assert!(recovered.valid);
        assert_eq!(evaluator.calls(), 4);
    }

    #[tokio::test]
    async fn test_out_of_range_scores_are_invalid() {
        let rubric = rubric();
        let evaluator = Arc::new(FixedEvaluator::new(uniform_scores(&rubric, 11.0)));
        let scorer = scorer(evaluator, fast_config());

        let score = scorer.score(&submission("a", "overrated")).await;
        assert!(!score.valid);
        assert!(score.rejection.unwrap().contains("outside"));
    }

    #[tokio::test]
    async fn test_batch_dedupes_identical_texts() {
        let rubric = rubric();
        let evaluator = Arc::new(FixedEvaluator::new(uniform_scores(&rubric, 6.0)));
        let scorer = scorer(evaluator.clone(), fast_config());

        let scored = scorer
            .score_all(
                vec![
                    submission("a", "dup"),
                    submission("b", "dup"),
                    submission("c", "unique"),
                ],
                Instant::now() + Duration::from_secs(5),
            )
            .await;

        assert_eq!(scored.len(), 3);
        assert_eq!(scored[0].participant().as_str(), "a");
        assert_eq!(scored[2].participant().as_str(), "c");
        assert_eq!(scored[0].score, scored[1].score);
        assert_eq!(evaluator.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_slow_calls() {
        let rubric = rubric();
        let evaluator = Arc::new(
            FixedEvaluator::new(uniform_scores(&rubric, 6.0)).with_delay(Duration::from_secs(10)),
        );
        let config = ScoringConfig {
            call_timeout_ms: 60_000,
            ..fast_config()
        };
        let scorer = scorer(evaluator, config);

        let scored = scorer
            .score_all(
                vec![submission("a", "slow")],
                Instant::now() + Duration::from_secs(1),
            )
            .await;

        assert!(!scored[0].score.valid);
        assert_eq!(
            scored[0].score.rejection.as_deref(),
            Some("epoch deadline exceeded")
        );
    }

    #[tokio::test]
    async fn test_score_groups_keeps_membership() {
        let rubric = rubric();
        let evaluator = Arc::new(FixedEvaluator::new(uniform_scores(&rubric, 6.0)));
        let scorer = scorer(evaluator, fast_config());

        let mut groups = BTreeMap::new();
        groups.insert(
            "p1".to_string(),
            vec![submission("a", "one"), submission("b", "two")],
        );
        groups.insert("p2".to_string(), vec![submission("c", "three")]);

        let scored = scorer
            .score_groups(groups, Instant::now() + Duration::from_secs(5))
            .await;
        assert_eq!(scored["p1"].len(), 2);
        assert_eq!(scored["p2"].len(), 1);
        assert_eq!(scored["p2"][0].participant().as_str(), "c");
    }
}

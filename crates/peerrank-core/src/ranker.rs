//! Ranking within a paper-group and rank-decayed reward distribution.

use std::cmp::Ordering;

use crate::config::{RewardConfig, SingleEntryPolicy};
use crate::domain::{GroupPayout, RankedGroup, ScoredSubmission};

/// Total order used inside a group, best first.
///
/// 1. higher aggregate score
/// 2. higher confidence-weighted rating (present beats absent)
/// 3. reviewer id, ascending
/// 4. participant id, ascending
pub fn compare_entries(a: &ScoredSubmission, b: &ScoredSubmission) -> Ordering {
    b.score
        .aggregate
        .total_cmp(&a.score.aggregate)
        .then_with(|| {
            let ra = a.submission.review.confidence_weighted_rating();
            let rb = b.submission.review.confidence_weighted_rating();
            match (ra, rb) {
                (Some(x), Some(y)) => y.total_cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
        .then_with(|| {
            a.submission
                .review
                .reviewer_id
                .cmp(&b.submission.review.reviewer_id)
        })
        .then_with(|| a.submission.participant.cmp(&b.submission.participant))
}

/// Split a group into ranked valid entries and excluded invalid ones.
pub fn rank_group(paper_id: impl Into<String>, entries: Vec<ScoredSubmission>) -> RankedGroup {
    let (mut ranked, mut excluded): (Vec<_>, Vec<_>) =
        entries.into_iter().partition(|e| e.score.valid);
    ranked.sort_by(compare_entries);
    excluded.sort_by(|a, b| a.submission.participant.cmp(&b.submission.participant));
    RankedGroup {
        paper_id: paper_id.into(),
        ranked,
        excluded,
    }
}

/// Unnormalized weights `decay^i` for ranks `0..n`.
pub fn rank_weights(n: usize, decay: f64) -> Vec<f64> {
    let mut weights = Vec::with_capacity(n);
    let mut w = 1.0;
    for _ in 0..n {
        weights.push(w);
        w *= decay;
    }
    weights
}

/// Turn a ranked group into rewards.
///
/// Valid entries share `group_budget` in proportion to their rank weight.
/// Excluded entries get 0, an all-invalid group pays nothing, and a group
/// with a single valid entry follows [`SingleEntryPolicy`]. The payout never
/// exceeds the budget.
pub fn distribute(group: &RankedGroup, config: &RewardConfig) -> GroupPayout {
    let budget = config.group_budget;
    let n = group.ranked.len();
    let pays = n > 1 || (n == 1 && config.single_entry == SingleEntryPolicy::FullBudget);

    let mut amounts: Vec<f64> = if pays {
        let weights = rank_weights(n, config.decay);
        let sum: f64 = weights.iter().sum();
        weights.iter().map(|w| budget * w / sum).collect()
    } else {
        vec![0.0; n]
    };

    let total: f64 = amounts.iter().sum();
    if total > budget {
        if let Some(last) = amounts.last_mut() {
            *last = (*last - (total - budget)).max(0.0);
        }
    }

    let rewards = group
        .ranked
        .iter()
        .zip(amounts)
        .map(|(e, r)| (e.submission.participant.clone(), r))
        .chain(
            group
                .excluded
                .iter()
                .map(|e| (e.submission.participant.clone(), 0.0)),
        )
        .collect();

    GroupPayout {
        paper_id: group.paper_id.clone(),
        budget,
        rewards,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fingerprint, Grade, Review, RubricScore, Submission};
    use peerrank_state::ParticipantId;
    use std::collections::BTreeMap;

    fn entry(participant: &str, aggregate: f64, valid: bool) -> ScoredSubmission {
        let fp = Fingerprint::compute(participant.as_bytes());
        let score = if valid {
            RubricScore {
                fingerprint: fp,
                sub_scores: BTreeMap::new(),
                aggregate,
                valid: true,
                rejection: None,
            }
        } else {
            RubricScore::rejected(fp, "bad")
        };
        ScoredSubmission {
            submission: Submission {
                participant: ParticipantId::new(participant),
                review: Review::new("p1", "text"),
            },
            score,
        }
    }

    fn order(group: &RankedGroup) -> Vec<&str> {
        group
            .ranked
            .iter()
            .map(|e| e.submission.participant.as_str())
            .collect()
    }

    #[test]
    fn test_scenario_three_entries_half_decay() {
        let group = rank_group(
            "A",
            vec![entry("c", 5.0, true), entry("a", 9.0, true), entry("b", 7.0, true)],
        );
        assert_eq!(order(&group), vec!["a", "b", "c"]);

        let payout = distribute(&group, &RewardConfig::default());
        let r: Vec<f64> = payout.rewards.iter().map(|(_, r)| *r).collect();
        assert!((r[0] - 4.0 / 7.0).abs() < 1e-9);
        assert!((r[1] - 2.0 / 7.0).abs() < 1e-9);
        assert!((r[2] - 1.0 / 7.0).abs() < 1e-9);
        assert!((r[0] - 0.571).abs() < 1e-3);
        assert!(payout.total() <= payout.budget + 1e-12);
    }

    #[test]
    fn test_all_invalid_group_pays_zero() {
        let group = rank_group("B", vec![entry("x", 0.0, false)]);
        assert!(group.ranked.is_empty());
        let payout = distribute(&group, &RewardConfig::default());
        assert_eq!(payout.total(), 0.0);
        assert_eq!(payout.reward_of(&ParticipantId::new("x")), Some(0.0));
    }

    #[test]
    fn test_invalid_entries_are_excluded_not_ranked() {
        let group = rank_group(
            "p",
            vec![entry("a", 8.0, true), entry("b", 0.0, false), entry("c", 6.0, true)],
        );
        let payout = distribute(&group, &RewardConfig::default());
        assert_eq!(payout.reward_of(&ParticipantId::new("b")), Some(0.0));
        assert!((payout.reward_of(&ParticipantId::new("a")).unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert!((payout.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_entry_policies() {
        let group = rank_group("p", vec![entry("solo", 4.0, true)]);

        let full = distribute(&group, &RewardConfig::default());
        assert_eq!(full.reward_of(&ParticipantId::new("solo")), Some(1.0));

        let exclude = RewardConfig {
            single_entry: SingleEntryPolicy::Exclude,
            ..RewardConfig::default()
        };
        assert_eq!(distribute(&group, &exclude).total(), 0.0);
    }

    #[test]
    fn test_rewards_strictly_decrease_with_rank() {
        let entries = (0..8)
            .map(|i| entry(&format!("m{i}"), 10.0 - i as f64, true))
            .collect();
        let group = rank_group("p", entries);
        for decay in [0.1, 0.5, 0.9, 0.999] {
            let config = RewardConfig {
                decay,
                ..RewardConfig::default()
            };
            let payout = distribute(&group, &config);
            assert!(payout
                .rewards
                .windows(2)
                .all(|w| w[0].1 > w[1].1));
            assert!(payout.total() <= payout.budget + 1e-12);
        }
    }

    #[test]
    fn test_custom_budget() {
        let group = rank_group("p", vec![entry("a", 2.0, true), entry("b", 1.0, true)]);
        let config = RewardConfig {
            group_budget: 3.0,
            ..RewardConfig::default()
        };
        let payout = distribute(&group, &config);
        assert!((payout.total() - 3.0).abs() < 1e-9);
        assert!((payout.reward_of(&ParticipantId::new("a")).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_break_prefers_confidence_weighted_rating() {
        let mut low = entry("a", 5.0, true);
        low.submission.review = Review::new("p1", "x")
            .with_rating(Grade::Numeric(6.0))
            .with_confidence(Grade::Numeric(2.0));
        let mut high = entry("b", 5.0, true);
        high.submission.review = Review::new("p1", "y")
            .with_rating(Grade::Ordinal("8: accept, good paper".to_string()))
            .with_confidence(Grade::Numeric(3.0));
        let unrated = entry("0", 5.0, true);

        let group = rank_group("p", vec![low, unrated, high]);
        assert_eq!(order(&group), vec!["b", "a", "0"]);
    }

    #[test]
    fn test_tie_break_falls_back_to_reviewer_then_participant() {
        let mut a = entry("z", 5.0, true);
        a.submission.review = Review::new("p1", "x").with_reviewer("rev-a");
        let mut b = entry("y", 5.0, true);
        b.submission.review = Review::new("p1", "y").with_reviewer("rev-b");
        let c = entry("x", 5.0, true);
        let d = entry("w", 5.0, true);

        let group = rank_group("p", vec![a, b, c, d]);
        // Blank reviewer ids sort first, then participant id.
        assert_eq!(order(&group), vec!["w", "x", "z", "y"]);
    }

    #[test]
    fn test_rank_weights() {
        assert_eq!(rank_weights(3, 0.5), vec![1.0, 0.5, 0.25]);
        assert!(rank_weights(0, 0.5).is_empty());
    }
}

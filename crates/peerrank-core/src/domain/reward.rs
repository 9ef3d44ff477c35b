//! Ranked groups, group payouts, and the per-epoch reward vector.

use std::collections::BTreeMap;

use peerrank_state::ParticipantId;
use serde::{Deserialize, Serialize};

use super::rubric::RubricScore;
use super::submission::Submission;

/// A submission paired with its rubric score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSubmission {
    pub submission: Submission,
    pub score: RubricScore,
}

impl ScoredSubmission {
    pub fn participant(&self) -> &ParticipantId {
        &self.submission.participant
    }
}

/// Submissions for one paper, valid entries ordered best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedGroup {
    pub paper_id: String,
    /// Valid submissions, aggregate score descending, ties broken
    /// deterministically.
    pub ranked: Vec<ScoredSubmission>,
    /// Invalid submissions; never ranked, never rewarded.
    pub excluded: Vec<ScoredSubmission>,
}

/// Reward paid out for one paper-group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPayout {
    pub paper_id: String,
    pub budget: f64,
    /// Rewards in rank order, followed by excluded entries at 0.
    pub rewards: Vec<(ParticipantId, f64)>,
}

impl GroupPayout {
    pub fn total(&self) -> f64 {
        self.rewards.iter().map(|(_, r)| r).sum()
    }

    pub fn reward_of(&self, participant: &ParticipantId) -> Option<f64> {
        self.rewards
            .iter()
            .find(|(p, _)| p == participant)
            .map(|(_, r)| *r)
    }
}

/// Per-participant reward for one epoch, each value in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardVector {
    rewards: BTreeMap<ParticipantId, f64>,
}

impl RewardVector {
    /// Combine group payouts into one vector over the dispatched set.
    ///
    /// Every dispatched participant gets an entry (0 unless paid). Payouts
    /// are summed across groups, then renormalized so the vector sums to 1
    /// whenever anything was paid.
    pub fn from_payouts(dispatched: &[ParticipantId], payouts: &[GroupPayout]) -> Self {
        let mut rewards: BTreeMap<ParticipantId, f64> =
            dispatched.iter().map(|p| (p.clone(), 0.0)).collect();

        for payout in payouts {
            for (participant, reward) in &payout.rewards {
                *rewards.entry(participant.clone()).or_insert(0.0) += reward;
            }
        }

        let total: f64 = rewards.values().sum();
        if total > 0.0 {
            for r in rewards.values_mut() {
                *r = (*r / total).clamp(0.0, 1.0);
            }
        }
        Self { rewards }
    }

    pub fn get(&self, participant: &ParticipantId) -> f64 {
        self.rewards.get(participant).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.rewards.values().sum()
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, &f64)> {
        self.rewards.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    fn payout(paper: &str, rewards: &[(&str, f64)]) -> GroupPayout {
        GroupPayout {
            paper_id: paper.to_string(),
            budget: 1.0,
            rewards: rewards.iter().map(|(p, r)| (pid(p), *r)).collect(),
        }
    }

    #[test]
    fn test_single_group_vector_is_unchanged() {
        let dispatched = vec![pid("a"), pid("b"), pid("c"), pid("d")];
        let payouts = vec![payout("p1", &[("a", 0.6), ("b", 0.4)])];
        let v = RewardVector::from_payouts(&dispatched, &payouts);

        assert!((v.get(&pid("a")) - 0.6).abs() < 1e-12);
        assert!((v.get(&pid("b")) - 0.4).abs() < 1e-12);
        assert_eq!(v.get(&pid("c")), 0.0);
        assert_eq!(v.len(), 4);
    }

    #[test]
    fn test_multiple_groups_renormalize_to_one() {
        let dispatched = vec![pid("a"), pid("b"), pid("c")];
        let payouts = vec![
            payout("p1", &[("a", 1.0)]),
            payout("p2", &[("b", 0.75), ("c", 0.25)]),
        ];
        let v = RewardVector::from_payouts(&dispatched, &payouts);

        assert!((v.total() - 1.0).abs() < 1e-12);
        assert!((v.get(&pid("a")) - 0.5).abs() < 1e-12);
        assert!((v.get(&pid("c")) - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_nothing_paid_is_all_zero() {
        let dispatched = vec![pid("a"), pid("b")];
        let payouts = vec![payout("p1", &[("a", 0.0)])];
        let v = RewardVector::from_payouts(&dispatched, &payouts);
        assert_eq!(v.total(), 0.0);
    }

    #[test]
    fn test_group_payout_lookup() {
        let p = payout("p1", &[("a", 0.7), ("b", 0.3)]);
        assert_eq!(p.reward_of(&pid("b")), Some(0.3));
        assert_eq!(p.reward_of(&pid("z")), None);
        assert!((p.total() - 1.0).abs() < 1e-12);
    }
}

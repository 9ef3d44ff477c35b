//! Per-participant EMA score ledger.
//!
//! The ledger owns an in-memory [`LedgerSnapshot`]; the scheduler is its
//! only writer. Persistence goes through a [`LedgerStore`] at startup, after
//! every epoch, and at shutdown.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use peerrank_state::{LedgerSnapshot, LedgerStore, ParticipantId, ParticipantScoreState};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{LedgerConfig, NonResponsePolicy};
use crate::domain::{Result, RewardVector};

/// `alpha * reward + (1 - alpha) * old`, clamped to `[0, 1]`.
pub fn ema_update(old: f64, reward: f64, alpha: f64) -> f64 {
    (alpha * reward + (1.0 - alpha) * old).clamp(0.0, 1.0)
}

/// What one [`ScoreLedger::apply_epoch`] call changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerUpdate {
    pub epoch: u64,
    /// False when the epoch was already applied.
    pub applied: bool,
    /// Responders, updated with their reward.
    pub updated: Vec<ParticipantId>,
    /// Non-responders updated with a reward of 0.
    pub decayed: Vec<ParticipantId>,
    /// Non-responders left untouched.
    pub skipped: Vec<ParticipantId>,
}

#[derive(Debug, Clone)]
pub struct ScoreLedger {
    snapshot: LedgerSnapshot,
    config: LedgerConfig,
}

impl ScoreLedger {
    pub fn new(snapshot: LedgerSnapshot, config: LedgerConfig) -> Self {
        Self { snapshot, config }
    }

    /// Load from `store`. An absent ledger starts empty; an unreadable one
    /// is an error and is never replaced silently.
    pub async fn open(store: &dyn LedgerStore, config: LedgerConfig) -> Result<Self> {
        let snapshot = match store.load().await? {
            Some(snapshot) => {
                info!(
                    participants = snapshot.participants.len(),
                    last_epoch = ?snapshot.last_epoch,
                    "ledger opened"
                );
                snapshot
            }
            None => LedgerSnapshot::empty(),
        };
        Ok(Self::new(snapshot, config))
    }

    pub fn last_epoch(&self) -> Option<u64> {
        self.snapshot.last_epoch
    }

    /// First epoch index not yet applied.
    pub fn next_epoch(&self) -> u64 {
        self.snapshot.last_epoch.map_or(0, |e| e + 1)
    }

    pub fn state(&self, participant: &ParticipantId) -> Option<&ParticipantScoreState> {
        self.snapshot.participants.get(participant)
    }

    pub fn snapshot(&self) -> &LedgerSnapshot {
        &self.snapshot
    }

    pub fn len(&self) -> usize {
        self.snapshot.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.participants.is_empty()
    }

    /// Fold one epoch's rewards into the EMA.
    ///
    /// Responders are updated with their reward (0 when absent from
    /// `rewards`). Non-responders follow [`NonResponsePolicy`]. Anyone not
    /// dispatched is untouched. Applying an epoch at or before the last
    /// applied one is a no-op.
    pub fn apply_epoch(
        &mut self,
        epoch: u64,
        responded: &BTreeSet<ParticipantId>,
        non_responded: &BTreeSet<ParticipantId>,
        rewards: &RewardVector,
    ) -> LedgerUpdate {
        let mut update = LedgerUpdate {
            epoch,
            ..LedgerUpdate::default()
        };
        if let Some(last) = self.snapshot.last_epoch {
            if epoch <= last {
                warn!(epoch, last_epoch = last, "epoch already applied, ignoring");
                return update;
            }
        }

        let alpha = self.config.alpha;
        for participant in responded {
            self.fold(participant, epoch, rewards.get(participant), alpha);
            update.updated.push(participant.clone());
        }

        for participant in non_responded.difference(responded) {
            match self.config.non_response {
                NonResponsePolicy::Skip => update.skipped.push(participant.clone()),
                NonResponsePolicy::Decay => {
                    self.fold(participant, epoch, 0.0, alpha);
                    update.decayed.push(participant.clone());
                }
            }
        }

        self.snapshot.last_epoch = Some(epoch);
        update.applied = true;
        debug!(
            epoch,
            updated = update.updated.len(),
            decayed = update.decayed.len(),
            skipped = update.skipped.len(),
            "ledger updated"
        );
        update
    }

    fn fold(&mut self, participant: &ParticipantId, epoch: u64, reward: f64, alpha: f64) {
        let state = self
            .snapshot
            .participants
            .entry(participant.clone())
            .or_insert_with(|| ParticipantScoreState::bootstrap(epoch));
        state.ema_score = ema_update(state.ema_score, reward, alpha);
        state.epochs_observed += 1;
        state.last_epoch = epoch;
        state.updated_at = Utc::now();
    }

    /// Normalized weights `ema / Σ ema`. Empty when every EMA is 0.
    pub fn weights(&self) -> BTreeMap<ParticipantId, f64> {
        let total: f64 = self
            .snapshot
            .participants
            .values()
            .map(|s| s.ema_score)
            .sum();
        if total <= 0.0 {
            return BTreeMap::new();
        }
        self.snapshot
            .participants
            .iter()
            .map(|(p, s)| (p.clone(), s.ema_score / total))
            .collect()
    }

    pub async fn persist(&self, store: &dyn LedgerStore) -> Result<()> {
        store.persist(&self.snapshot).await?;
        Ok(())
    }
}

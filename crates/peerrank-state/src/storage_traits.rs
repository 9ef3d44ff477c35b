//! Storage trait definitions for PeerRank
//!
//! - `ParticipantScoreState`: the per-participant EMA record
//! - `LedgerSnapshot`: every record plus the last applied epoch
//! - `LedgerStore`: load/persist of a snapshot as one atomic unit
//!
//! The trait is async and backend-agnostic. An in-memory fake lives in the
//! `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::Result;

/// Current on-disk format of [`LedgerSnapshot`].
pub const LEDGER_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// ParticipantId
// ---------------------------------------------------------------------------

/// Identifier of a participant (miner) contacted for review submissions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        ParticipantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifiers must contain at least one non-whitespace character.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        ParticipantId(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// ParticipantScoreState
// ---------------------------------------------------------------------------

/// Persistent EMA record of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantScoreState {
    /// Exponential moving average of epoch rewards, always in `[0, 1]`
    pub ema_score: f64,
    /// Number of epochs in which this record was updated
    pub epochs_observed: u64,
    /// Index of the last epoch that updated this record
    pub last_epoch: u64,
    /// Wall-clock time of the last update
    pub updated_at: DateTime<Utc>,
}

impl ParticipantScoreState {
    /// Record for a participant that has not been scored yet.
    pub fn bootstrap(epoch: u64) -> Self {
        Self {
            ema_score: 0.0,
            epochs_observed: 0,
            last_epoch: epoch,
            updated_at: Utc::now(),
        }
    }

    /// Check the record against the ledger invariants.
    pub fn validate(&self, participant: &ParticipantId) -> Result<()> {
        if !self.ema_score.is_finite() || !(0.0..=1.0).contains(&self.ema_score) {
            return Err(StateError::InvalidRecord {
                participant: participant.to_string(),
                reason: format!("ema_score {} outside [0, 1]", self.ema_score),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LedgerSnapshot
// ---------------------------------------------------------------------------

/// Everything the ledger persists.
///
/// Participants are kept in a `BTreeMap` so the encoded form is
/// deterministic: loading a snapshot and persisting it again yields the same
/// bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub format_version: u32,
    /// Last epoch applied to this snapshot (`None` before the first epoch)
    pub last_epoch: Option<u64>,
    pub participants: BTreeMap<ParticipantId, ParticipantScoreState>,
}

impl Default for LedgerSnapshot {
    fn default() -> Self {
        Self {
            format_version: LEDGER_FORMAT_VERSION,
            last_epoch: None,
            participants: BTreeMap::new(),
        }
    }
}

impl LedgerSnapshot {
    /// Empty snapshot used on first run.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check version and every participant record.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != LEDGER_FORMAT_VERSION {
            return Err(StateError::UnsupportedVersion {
                found: self.format_version,
                expected: LEDGER_FORMAT_VERSION,
            });
        }
        for (participant, state) in &self.participants {
            if participant.is_blank() {
                return Err(StateError::InvalidRecord {
                    participant: participant.to_string(),
                    reason: "blank participant id".to_string(),
                });
            }
            state.validate(participant)?;
        }
        Ok(())
    }

    /// Canonical encoding (pretty JSON with a trailing newline).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Decode and validate. Never repairs a record.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let snapshot: LedgerSnapshot = serde_json::from_slice(bytes)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// Durable home of the score ledger.
///
/// Guarantees:
/// - `load` returns `Ok(None)` only when nothing was ever persisted.
/// - `load` fails on unreadable or invalid content instead of guessing.
/// - `persist` replaces the previous snapshot atomically.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the last persisted snapshot, if any.
    async fn load(&self) -> Result<Option<LedgerSnapshot>>;

    /// Persist a snapshot, replacing the previous one.
    async fn persist(&self, snapshot: &LedgerSnapshot) -> Result<()>;

    /// Discard persisted state (explicit bootstrap policy).
    async fn reset(&self) -> Result<()>;
}

//! Validator configuration.
//!
//! Loaded from TOML; every section has defaults so an empty file (or no
//! file) yields a working configuration. [`ValidatorConfig::validate`] must
//! pass before the first epoch runs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{ConfigError, Rubric};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub dispatch: DispatchConfig,
    pub scoring: ScoringConfig,
    pub reward: RewardConfig,
    pub ledger: LedgerConfig,
    pub schedule: ScheduleConfig,
    pub rubric: Rubric,
}

impl ValidatorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file. Does not validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check every range constraint. Any failure is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rubric.validate()?;
        self.dispatch.validate()?;
        self.scoring.validate()?;
        self.reward.validate()?;
        self.ledger.validate()?;
        self.schedule.validate()?;
        Ok(())
    }
}

fn out_of_range(field: &'static str, value: impl ToString, expected: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
        expected,
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Participants contacted per epoch; all of them when the population is
    /// smaller.
    pub sample_size: usize,
    /// Per-request timeout, further capped by the epoch deadline.
    pub timeout_ms: u64,
    pub max_concurrent: usize,
    /// Longest accepted review text, in characters.
    pub max_review_chars: usize,
    /// Seed for participant sampling. Unseeded draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            sample_size: 16,
            timeout_ms: 12_000,
            max_concurrent: 64,
            max_review_chars: 20_000,
            seed: None,
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_size == 0 {
            return Err(out_of_range("dispatch.sample_size", self.sample_size, ">= 1"));
        }
        if self.timeout_ms == 0 {
            return Err(out_of_range("dispatch.timeout_ms", self.timeout_ms, ">= 1"));
        }
        if self.max_concurrent == 0 {
            return Err(out_of_range("dispatch.max_concurrent", self.max_concurrent, ">= 1"));
        }
        if self.max_review_chars == 0 {
            return Err(out_of_range(
                "dispatch.max_review_chars",
                self.max_review_chars,
                ">= 1",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Retries after the first failed evaluator call.
    pub max_retries: u32,
    /// First backoff delay; doubled on every retry.
    pub backoff_base_ms: u64,
    /// Timeout of a single evaluator call.
    pub call_timeout_ms: u64,
    /// Concurrent evaluator calls.
    pub max_concurrent: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 500,
            call_timeout_ms: 30_000,
            max_concurrent: 4,
        }
    }
}

impl ScoringConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout_ms == 0 {
            return Err(out_of_range("scoring.call_timeout_ms", self.call_timeout_ms, ">= 1"));
        }
        if self.max_concurrent == 0 {
            return Err(out_of_range("scoring.max_concurrent", self.max_concurrent, ">= 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reward
// ---------------------------------------------------------------------------

/// Payout for a paper-group with exactly one valid submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleEntryPolicy {
    /// The lone submission receives the whole group budget.
    #[default]
    FullBudget,
    /// The group pays nothing.
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Rank decay factor, strictly between 0 and 1.
    pub decay: f64,
    /// Budget of each scored paper-group.
    pub group_budget: f64,
    pub single_entry: SingleEntryPolicy,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            decay: 0.5,
            group_budget: 1.0,
            single_entry: SingleEntryPolicy::FullBudget,
        }
    }
}

impl RewardConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.decay > 0.0 && self.decay < 1.0) {
            return Err(out_of_range("reward.decay", self.decay, "in (0, 1)"));
        }
        if !(self.group_budget.is_finite() && self.group_budget > 0.0) {
            return Err(out_of_range("reward.group_budget", self.group_budget, "> 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// How the EMA treats dispatched participants that did not respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonResponsePolicy {
    /// Leave their record unchanged.
    #[default]
    Skip,
    /// Apply the EMA update with a reward of 0.
    Decay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// EMA smoothing factor in (0, 1].
    pub alpha: f64,
    pub non_response: NonResponsePolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            non_response: NonResponsePolicy::Skip,
        }
    }
}

impl LedgerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(out_of_range("ledger.alpha", self.alpha, "in (0, 1]"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Time between epoch starts.
    pub interval_secs: u64,
    /// Hard cap on dispatch plus scoring within one epoch.
    pub epoch_deadline_secs: u64,
    /// Stop after this many epochs.
    pub max_epochs: Option<u64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            epoch_deadline_secs: 120,
            max_epochs: None,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn epoch_deadline(&self) -> Duration {
        Duration::from_secs(self.epoch_deadline_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(out_of_range("schedule.interval_secs", self.interval_secs, ">= 1"));
        }
        if self.epoch_deadline_secs == 0 {
            return Err(out_of_range(
                "schedule.epoch_deadline_secs",
                self.epoch_deadline_secs,
                ">= 1",
            ));
        }
        Ok(())
    }
}

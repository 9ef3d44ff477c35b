//! Epoch scheduler: drives dispatch, grouping, scoring, ranking, the ledger
//! update and weight publication once per interval.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use peerrank_state::{LedgerStore, ParticipantId};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::config::ValidatorConfig;
use crate::dispatch::{Dispatcher, ParticipantClient};
use crate::domain::{GroupPayout, PaperCatalog, RankedGroup, Result, RewardVector};
use crate::grouper::group_by_paper;
use crate::ledger::ScoreLedger;
use crate::metrics::METRICS;
use crate::obs::{
    emit_epoch_finished, emit_epoch_started, emit_ledger_persist_error, emit_publish_error,
    emit_stage_entered, epoch_span,
};
use crate::publish::WeightPublisher;
use crate::ranker::{distribute, rank_group};
use crate::scoring::{RubricEvaluator, RubricScorer, ScoreCache};

/// Where the scheduler is within an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochStage {
    Idle,
    Dispatching,
    Grouping,
    Scoring,
    Ranking,
    LedgerUpdate,
    Publishing,
}

impl EpochStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpochStage::Idle => "idle",
            EpochStage::Dispatching => "dispatching",
            EpochStage::Grouping => "grouping",
            EpochStage::Scoring => "scoring",
            EpochStage::Ranking => "ranking",
            EpochStage::LedgerUpdate => "ledger_update",
            EpochStage::Publishing => "publishing",
        }
    }
}

impl std::fmt::Display for EpochStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one completed epoch.
#[derive(Debug, Clone, Serialize)]
pub struct EpochReport {
    pub report_id: Uuid,
    pub epoch: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dispatched: usize,
    pub valid_responses: usize,
    pub rejected_responses: usize,
    pub dropped_submissions: usize,
    /// Groups with at least one valid score.
    pub papers_scored: usize,
    pub scored_submissions: usize,
    pub invalid_submissions: usize,
    pub total_reward: f64,
    pub ledger_applied: bool,
    pub ledger_persisted: bool,
    pub published: bool,
    pub rewards: BTreeMap<ParticipantId, f64>,
    pub payouts: Vec<GroupPayout>,
}

/// External collaborators of the scheduler.
pub struct PipelineDeps {
    pub participants: Arc<dyn ParticipantClient>,
    pub population: Vec<ParticipantId>,
    pub catalog: Arc<PaperCatalog>,
    pub evaluator: Arc<dyn RubricEvaluator>,
    pub cache: Arc<dyn ScoreCache>,
    pub store: Arc<dyn LedgerStore>,
    pub publisher: Arc<dyn WeightPublisher>,
}

pub struct EpochScheduler {
    config: ValidatorConfig,
    dispatcher: Dispatcher,
    scorer: RubricScorer,
    catalog: Arc<PaperCatalog>,
    population: Vec<ParticipantId>,
    store: Arc<dyn LedgerStore>,
    publisher: Arc<dyn WeightPublisher>,
    ledger: ScoreLedger,
    next_epoch: u64,
    stage: EpochStage,
}

impl EpochScheduler {
    /// Validate the configuration and load the ledger. Both failures are
    /// fatal: no epoch runs against a bad config or an unreadable ledger.
    pub async fn open(config: ValidatorConfig, deps: PipelineDeps) -> Result<Self> {
        config.validate()?;
        let ledger = ScoreLedger::open(deps.store.as_ref(), config.ledger.clone()).await?;
        let next_epoch = ledger.next_epoch();

        let dispatcher = Dispatcher::new(deps.participants, config.dispatch.clone());
        let scorer = RubricScorer::new(
            deps.evaluator,
            deps.cache,
            config.rubric.clone(),
            config.scoring.clone(),
        );

        info!(
            population = deps.population.len(),
            papers = deps.catalog.len(),
            next_epoch,
            "scheduler ready"
        );

        Ok(Self {
            config,
            dispatcher,
            scorer,
            catalog: deps.catalog,
            population: deps.population,
            store: deps.store,
            publisher: deps.publisher,
            ledger,
            next_epoch,
            stage: EpochStage::Idle,
        })
    }

    pub fn ledger(&self) -> &ScoreLedger {
        &self.ledger
    }

    pub fn next_epoch(&self) -> u64 {
        self.next_epoch
    }

    pub fn stage(&self) -> EpochStage {
        self.stage
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    fn enter(&mut self, stage: EpochStage, epoch: u64) {
        self.stage = stage;
        emit_stage_entered(epoch, stage.as_str());
    }

    /// Run one full epoch. Never fails: per-entity problems become zero
    /// rewards, and persistence or publication failures are reported in the
    /// returned [`EpochReport`].
    pub async fn run_epoch(&mut self) -> EpochReport {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        self.execute_epoch(epoch)
            .instrument(epoch_span(epoch))
            .await
    }

    async fn execute_epoch(&mut self, epoch: u64) -> EpochReport {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        let deadline = Instant::now() + self.config.schedule.epoch_deadline();
        emit_epoch_started(epoch, self.population.len());

        self.enter(EpochStage::Dispatching, epoch);
        let outcome = self
            .dispatcher
            .dispatch(epoch, &self.population, deadline)
            .await;

        self.enter(EpochStage::Grouping, epoch);
        let responders = outcome.responders();
        let store = group_by_paper(outcome.responded.clone(), Arc::clone(&self.catalog));
        let dropped_submissions = store.dropped().len();
        let groups = store.into_groups();

        self.enter(EpochStage::Scoring, epoch);
        let scored = self.scorer.score_groups(groups, deadline).await;

        self.enter(EpochStage::Ranking, epoch);
        let ranked: Vec<RankedGroup> = scored
            .into_iter()
            .map(|(paper_id, entries)| rank_group(paper_id, entries))
            .collect();
        let payouts: Vec<GroupPayout> = ranked
            .iter()
            .map(|g| distribute(g, &self.config.reward))
            .collect();
        let rewards = RewardVector::from_payouts(&outcome.dispatched, &payouts);

        self.enter(EpochStage::LedgerUpdate, epoch);
        let update = self
            .ledger
            .apply_epoch(epoch, &responders, &outcome.non_responded, &rewards);
        let ledger_persisted = match self.ledger.persist(self.store.as_ref()).await {
            Ok(()) => true,
            Err(e) => {
                emit_ledger_persist_error(epoch, &e);
                false
            }
        };

        self.enter(EpochStage::Publishing, epoch);
        let weights = self.ledger.weights();
        let published = match self.publisher.publish(epoch, &weights).await {
            Ok(()) => true,
            Err(e) => {
                emit_publish_error(epoch, &e);
                false
            }
        };

        self.stage = EpochStage::Idle;

        let scored_submissions = ranked.iter().map(|g| g.ranked.len()).sum();
        let invalid_submissions = ranked.iter().map(|g| g.excluded.len()).sum();
        let papers_scored = ranked.iter().filter(|g| !g.ranked.is_empty()).count();
        let total_reward = rewards.total();

        METRICS.inc_epochs_completed();
        METRICS.flush();
        emit_epoch_finished(
            epoch,
            clock.elapsed().as_millis() as u64,
            scored_submissions,
            total_reward,
            ledger_persisted,
        );

        EpochReport {
            report_id: Uuid::new_v4(),
            epoch,
            started_at,
            finished_at: Utc::now(),
            dispatched: outcome.dispatched_count(),
            valid_responses: outcome.valid_count(),
            rejected_responses: outcome.rejected.len(),
            dropped_submissions,
            papers_scored,
            scored_submissions,
            invalid_submissions,
            total_reward,
            ledger_applied: update.applied,
            ledger_persisted,
            published,
            rewards: rewards.iter().map(|(p, r)| (p.clone(), *r)).collect(),
            payouts,
        }
    }

    /// Run epochs every `schedule.interval_secs` until `shutdown` flips to
    /// true (or its sender is dropped) or `schedule.max_epochs` is reached.
    ///
    /// A shutdown request never interrupts a running epoch. The ledger is
    /// persisted once more before returning. Returns the number of epochs
    /// run.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<u64> {
        let mut ticker = tokio::time::interval(self.config.schedule.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut completed = 0u64;
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Some(max) = self.config.schedule.max_epochs {
                if completed >= max {
                    info!(max_epochs = max, "epoch limit reached");
                    break;
                }
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let report = self.run_epoch().await;
            completed += 1;
            info!(
                epoch = report.epoch,
                dispatched = report.dispatched,
                valid = report.valid_responses,
                scored = report.scored_submissions,
                total_reward = report.total_reward,
                "epoch report"
            );
        }

        self.shutdown().await?;
        Ok(completed)
    }

    /// Final ledger write.
    pub async fn shutdown(&self) -> Result<()> {
        self.ledger.persist(self.store.as_ref()).await?;
        info!(
            participants = self.ledger.len(),
            last_epoch = ?self.ledger.last_epoch(),
            "scheduler stopped, ledger persisted"
        );
        Ok(())
    }
}

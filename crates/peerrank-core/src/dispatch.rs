//! Fan-out of review requests to sampled participants, fan-in under a
//! deadline.
//!
//! Every sampled participant gets one request; all requests run
//! concurrently (bounded by `dispatch.max_concurrent`) and share one
//! deadline. A reply that is late, missing, or fails shape checks makes the
//! participant a non-responder. Nothing is retried within an epoch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use peerrank_state::ParticipantId;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::config::DispatchConfig;
use crate::domain::{DispatchRequest, DispatchResponse, ResponseRejection, Submission};
use crate::metrics::METRICS;
use crate::obs::emit_dispatch_completed;

/// Transport to a single participant.
///
/// `Ok(None)` means the participant answered with nothing; `Err` is a
/// transport failure. Both count as a non-response.
#[async_trait]
pub trait ParticipantClient: Send + Sync {
    async fn request_review(
        &self,
        participant: &ParticipantId,
        request: &DispatchRequest,
    ) -> anyhow::Result<Option<DispatchResponse>>;
}

/// Result of one dispatch round.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub epoch_id: u64,
    /// Everyone a request was sent to, sorted.
    pub dispatched: Vec<ParticipantId>,
    pub responded: BTreeMap<ParticipantId, Submission>,
    /// `dispatched` minus `responded`.
    pub non_responded: BTreeSet<ParticipantId>,
    /// Replies that arrived but failed shape checks.
    pub rejected: Vec<(ParticipantId, ResponseRejection)>,
}

impl DispatchOutcome {
    pub fn valid_count(&self) -> usize {
        self.responded.len()
    }

    pub fn dispatched_count(&self) -> usize {
        self.dispatched.len()
    }

    pub fn responders(&self) -> BTreeSet<ParticipantId> {
        self.responded.keys().cloned().collect()
    }
}

pub struct Dispatcher {
    client: Arc<dyn ParticipantClient>,
    config: DispatchConfig,
    rng: Mutex<StdRng>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn ParticipantClient>, config: DispatchConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            client,
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Pick this epoch's participants.
    ///
    /// Blank and duplicate ids are ignored. The whole population is taken
    /// when it is no larger than `sample_size`; otherwise a uniform random
    /// sample. The result is sorted.
    pub fn select_participants(&self, population: &[ParticipantId]) -> Vec<ParticipantId> {
        let unique: Vec<ParticipantId> = population
            .iter()
            .filter(|p| !p.is_blank())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if self.config.sample_size >= unique.len() {
            return unique;
        }

        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let mut chosen: Vec<ParticipantId> = unique
            .choose_multiple(&mut *rng, self.config.sample_size)
            .cloned()
            .collect();
        chosen.sort();
        chosen
    }

    /// Run one dispatch round. Never fails; every problem is a non-response.
    #[instrument(skip(self, population), fields(population = population.len()))]
    pub async fn dispatch(
        &self,
        epoch_id: u64,
        population: &[ParticipantId],
        deadline: Instant,
    ) -> DispatchOutcome {
        let dispatched = self.select_participants(population);
        METRICS.add_participants_dispatched(dispatched.len() as u64);

        let request = DispatchRequest {
            epoch_id,
            requesting_participant_count: dispatched.len(),
        };
        let reply_by = (Instant::now() + self.config.timeout()).min(deadline);
        let sem = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));

        let mut tasks = JoinSet::new();
        for participant in &dispatched {
            let client = Arc::clone(&self.client);
            let sem = Arc::clone(&sem);
            let request = request.clone();
            let participant = participant.clone();
            tasks.spawn(async move {
                let reply = tokio::time::timeout_at(reply_by, async {
                    let _permit = sem.acquire_owned().await;
                    client.request_review(&participant, &request).await
                })
                .await;
                (participant, reply)
            });
        }

        let mut responded = BTreeMap::new();
        let mut rejected = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (participant, reply) = match joined {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "dispatch task failed");
                    continue;
                }
            };

            match reply {
                Err(_) => debug!(participant = %participant, "no reply before deadline"),
                Ok(Err(e)) => debug!(participant = %participant, error = %e, "request failed"),
                Ok(Ok(None)) => debug!(participant = %participant, "empty reply"),
                Ok(Ok(Some(response))) => {
                    match response.into_submission(&participant, self.config.max_review_chars) {
                        Ok(submission) => {
                            responded.insert(participant, submission);
                        }
                        Err(reason) => {
                            METRICS.inc_responses_rejected();
                            warn!(
                                event = "dispatch.response_rejected",
                                participant = %participant,
                                reason = %reason,
                            );
                            rejected.push((participant, reason));
                        }
                    }
                }
            }
        }

        let non_responded: BTreeSet<ParticipantId> = dispatched
            .iter()
            .filter(|p| !responded.contains_key(*p))
            .cloned()
            .collect();
        rejected.sort_by(|a, b| a.0.cmp(&b.0));

        emit_dispatch_completed(epoch_id, dispatched.len(), responded.len(), rejected.len());

        DispatchOutcome {
            epoch_id,
            dispatched,
            responded,
            non_responded,
            rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedParticipants;
    use std::time::Duration;

    fn population(n: usize) -> Vec<ParticipantId> {
        (0..n).map(|i| ParticipantId::new(format!("miner_{i}"))).collect()
    }

    fn dispatcher(client: ScriptedParticipants, sample_size: usize) -> Dispatcher {
        Dispatcher::new(
            Arc::new(client),
            DispatchConfig {
                sample_size,
                timeout_ms: 1_000,
                seed: Some(7),
                ..DispatchConfig::default()
            },
        )
    }

    #[test]
    fn test_exhaustive_when_sample_covers_population() {
        let d = dispatcher(ScriptedParticipants::new(), 10);
        let mut pop = population(3);
        pop.push(ParticipantId::new("miner_0"));
        pop.push(ParticipantId::new(" "));

        assert_eq!(d.select_participants(&pop), population(3));
    }

    #[test]
    fn test_sample_is_sorted_subset() {
        let d = dispatcher(ScriptedParticipants::new(), 4);
        let pop = population(20);
        let chosen = d.select_participants(&pop);

        assert_eq!(chosen.len(), 4);
        assert!(chosen.windows(2).all(|w| w[0] < w[1]));
        assert!(chosen.iter().all(|p| pop.contains(p)));
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let pop = population(50);
        let a = dispatcher(ScriptedParticipants::new(), 5).select_participants(&pop);
        let b = dispatcher(ScriptedParticipants::new(), 5).select_participants(&pop);
        assert_eq!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collects_valid_and_records_non_responders() {
        let client = ScriptedParticipants::new()
            .reply("miner_0", "p1", "good review")
            .reply("miner_1", "p1", "")
            .silent("miner_2")
            .reply_after("miner_3", "p1", "too late", Duration::from_secs(30))
            .failing("miner_4");
        let d = dispatcher(client, 10);

        let outcome = d
            .dispatch(1, &population(5), Instant::now() + Duration::from_secs(60))
            .await;

        assert_eq!(outcome.dispatched_count(), 5);
        assert_eq!(outcome.valid_count(), 1);
        assert!(outcome.responded.contains_key(&ParticipantId::new("miner_0")));
        assert_eq!(outcome.non_responded.len(), 4);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].1, ResponseRejection::MissingText);
    }

    #[tokio::test(start_paused = true)]
    async fn test_epoch_deadline_caps_request_timeout() {
        let client = ScriptedParticipants::new()
            .reply("miner_0", "p1", "fast")
            .reply_after("miner_1", "p1", "slow", Duration::from_millis(500));
        let d = dispatcher(client, 10);

        let outcome = d
            .dispatch(1, &population(2), Instant::now() + Duration::from_millis(200))
            .await;

        assert_eq!(outcome.valid_count(), 1);
        assert!(outcome
            .non_responded
            .contains(&ParticipantId::new("miner_1")));
    }
}

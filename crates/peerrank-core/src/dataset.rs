//! Preprocessed review datasets and a participant client that replays them.
//!
//! Layout of a dataset directory:
//!
//! ```text
//! paper_metadata.json        paper id -> paper
//! miner_assignments.json     {num_miners, total_reviews, total_papers, reviews_per_miner}
//! miner_<n>_reviews.json     ordered review records for participant miner_<n>
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use peerrank_state::ParticipantId;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dispatch::ParticipantClient;
use crate::domain::{
    DispatchRequest, DispatchResponse, Paper, PaperCatalog, PeerRankError, Result, Review,
};

pub const PAPER_METADATA_FILE: &str = "paper_metadata.json";
pub const ASSIGNMENTS_FILE: &str = "miner_assignments.json";

/// Participant id of the n-th dataset shard.
pub fn participant_id(index: usize) -> ParticipantId {
    ParticipantId::new(format!("miner_{index}"))
}

/// Review file of a participant inside `dir`.
pub fn reviews_path(dir: &Path, participant: &ParticipantId) -> PathBuf {
    dir.join(format!("{participant}_reviews.json"))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)
        .map_err(|e| PeerRankError::Dataset(format!("{}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PeerRankError::Dataset(format!("{}: {e}", path.display())))
}

// ---------------------------------------------------------------------------
// Catalog and assignment summary
// ---------------------------------------------------------------------------

/// Load `paper_metadata.json`. Map keys win over any `paper_id` field.
pub fn load_catalog(dir: &Path) -> Result<PaperCatalog> {
    let raw: BTreeMap<String, Paper> = read_json(&dir.join(PAPER_METADATA_FILE))?;
    Ok(PaperCatalog::from_papers(raw.into_iter().map(
        |(paper_id, mut paper)| {
            paper.paper_id = paper_id;
            paper
        },
    )))
}

/// Contents of `miner_assignments.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentSummary {
    pub num_miners: usize,
    pub total_reviews: usize,
    pub total_papers: usize,
    pub reviews_per_miner: Vec<usize>,
}

impl AssignmentSummary {
    pub fn validate(&self) -> Result<()> {
        if self.reviews_per_miner.len() != self.num_miners {
            return Err(PeerRankError::Dataset(format!(
                "reviews_per_miner lists {} shards, num_miners is {}",
                self.reviews_per_miner.len(),
                self.num_miners
            )));
        }
        let sum: usize = self.reviews_per_miner.iter().sum();
        if sum != self.total_reviews {
            return Err(PeerRankError::Dataset(format!(
                "reviews_per_miner sums to {sum}, total_reviews is {}",
                self.total_reviews
            )));
        }
        Ok(())
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        (0..self.num_miners).map(participant_id).collect()
    }
}

/// Load and check `miner_assignments.json`.
pub fn load_assignments(dir: &Path) -> Result<AssignmentSummary> {
    let summary: AssignmentSummary = read_json(&dir.join(ASSIGNMENTS_FILE))?;
    summary.validate()?;
    Ok(summary)
}

// ---------------------------------------------------------------------------
// ReviewDataset
// ---------------------------------------------------------------------------

/// One participant's reviews, served round-robin.
#[derive(Debug, Clone, Default)]
pub struct ReviewDataset {
    reviews: Vec<Review>,
    cursor: usize,
}

impl ReviewDataset {
    pub fn new(reviews: Vec<Review>) -> Self {
        Self { reviews, cursor: 0 }
    }

    /// Load a participant's shard. A missing file yields an empty dataset.
    pub fn load(dir: &Path, participant: &ParticipantId) -> Result<Self> {
        let path = reviews_path(dir, participant);
        if !path.exists() {
            warn!(path = %path.display(), "review shard not found, participant will not respond");
            return Ok(Self::default());
        }
        let reviews: Vec<Review> = read_json(&path)?;
        info!(participant = %participant, reviews = reviews.len(), "review shard loaded");
        Ok(Self::new(reviews))
    }

    /// Next review, wrapping to the start after the last one.
    pub fn next_review(&mut self) -> Option<&Review> {
        if self.reviews.is_empty() {
            return None;
        }
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.reviews.len();
        self.reviews.get(index)
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn len(&self) -> usize {
        self.reviews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reviews.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DatasetParticipantClient
// ---------------------------------------------------------------------------

/// [`ParticipantClient`] answering from local review shards.
#[derive(Debug, Default)]
pub struct DatasetParticipantClient {
    datasets: Mutex<BTreeMap<ParticipantId, ReviewDataset>>,
}

impl DatasetParticipantClient {
    pub fn new(datasets: BTreeMap<ParticipantId, ReviewDataset>) -> Self {
        Self {
            datasets: Mutex::new(datasets),
        }
    }

    /// Load every shard listed in the assignment summary of `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let summary = load_assignments(dir)?;
        let mut datasets = BTreeMap::new();
        for participant in summary.participants() {
            let dataset = ReviewDataset::load(dir, &participant)?;
            datasets.insert(participant, dataset);
        }
        Ok(Self::new(datasets))
    }

    pub fn population(&self) -> Vec<ParticipantId> {
        self.datasets
            .lock()
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ParticipantClient for DatasetParticipantClient {
    async fn request_review(
        &self,
        participant: &ParticipantId,
        _request: &DispatchRequest,
    ) -> anyhow::Result<Option<DispatchResponse>> {
        let mut datasets = self
            .datasets
            .lock()
            .map_err(|_| anyhow::anyhow!("dataset lock poisoned"))?;
        let Some(review) = datasets.get_mut(participant).and_then(|d| d.next_review()) else {
            return Ok(None);
        };

        Ok(Some(DispatchResponse {
            participant_id: participant.to_string(),
            paper_id: Some(review.paper_id.clone()),
            review_id: Some(review.review_id.clone()),
            review_text: Some(review.review_text.clone()),
            rating: review.rating.clone(),
            confidence: review.confidence.clone(),
            reviewer_id: Some(review.reviewer_id.clone()),
            metadata: review.metadata.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// What `peerrank dataset summary` prints.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub assignments: AssignmentSummary,
    pub catalog_papers: usize,
    pub reviews_loaded: BTreeMap<ParticipantId, usize>,
    /// Reviews naming a paper missing from the catalog.
    pub unknown_paper_reviews: usize,
}

pub fn summarize(dir: &Path) -> Result<DatasetSummary> {
    let assignments = load_assignments(dir)?;
    let catalog = load_catalog(dir)?;

    let mut reviews_loaded = BTreeMap::new();
    let mut unknown_paper_reviews = 0;
    for participant in assignments.participants() {
        let dataset = ReviewDataset::load(dir, &participant)?;
        unknown_paper_reviews += dataset
            .reviews()
            .iter()
            .filter(|r| !catalog.contains(&r.paper_id))
            .count();
        reviews_loaded.insert(participant, dataset.len());
    }

    Ok(DatasetSummary {
        assignments,
        catalog_papers: catalog.len(),
        reviews_loaded,
        unknown_paper_reviews,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Grade;
    use serde_json::json;

    fn write(dir: &Path, name: &str, value: serde_json::Value) {
        std::fs::write(dir.join(name), serde_json::to_vec_pretty(&value).unwrap()).unwrap();
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            PAPER_METADATA_FILE,
            json!({
                "p1": {"paper_id": "p1", "title": "Sparse Attention", "abstract": "We study..."},
                "p2": {"paper_id": "p2", "title": "Graph Nets", "abstract": ""}
            }),
        );
        write(
            dir.path(),
            ASSIGNMENTS_FILE,
            json!({
                "num_miners": 2,
                "total_reviews": 3,
                "total_papers": 2,
                "reviews_per_miner": [2, 1]
            }),
        );
        write(
            dir.path(),
            "miner_0_reviews.json",
            json!([
                {
                    "paper_id": "p1",
                    "review_id": "r1",
                    "title": "Sparse Attention",
                    "abstract": "We study...",
                    "review_text": "Summary: ...",
                    "summary": "s",
                    "strengths": "st",
                    "weaknesses": "w",
                    "rating": "6: marginally above the acceptance threshold"
                },
                {"paper_id": "p2", "review_id": "r2", "review_text": "Second review", "rating": 3}
            ]),
        );
        write(
            dir.path(),
            "miner_1_reviews.json",
            json!([{"paper_id": "p9", "review_id": "r3", "review_text": "Orphan"}]),
        );
        dir
    }

    #[test]
    fn test_load_catalog() {
        let dir = fixture();
        let catalog = load_catalog(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("p1").unwrap().abstract_text, "We study...");
    }

    #[test]
    fn test_assignment_consistency_check() {
        let bad = AssignmentSummary {
            num_miners: 2,
            total_reviews: 3,
            total_papers: 1,
            reviews_per_miner: vec![1, 1],
        };
        assert!(bad.validate().is_err());

        let wrong_len = AssignmentSummary {
            reviews_per_miner: vec![3],
            ..bad
        };
        assert!(wrong_len.validate().is_err());
    }

    #[test]
    fn test_review_records_keep_extra_fields() {
        let dir = fixture();
        let dataset = ReviewDataset::load(dir.path(), &participant_id(0)).unwrap();
        let first = &dataset.reviews()[0];

        assert_eq!(first.review_id, "r1");
        assert_eq!(first.rating.as_ref().and_then(Grade::value), Some(6.0));
        assert_eq!(first.metadata["strengths"], "st");
        assert!(first.metadata.contains_key("abstract"));
        assert_eq!(dataset.reviews()[1].rating, Some(Grade::Numeric(3.0)));
    }

    #[test]
    fn test_round_robin_wraps() {
        let mut dataset = ReviewDataset::new(vec![Review::new("a", "1"), Review::new("b", "2")]);
        let order: Vec<String> = (0..5)
            .filter_map(|_| dataset.next_review().map(|r| r.paper_id.clone()))
            .collect();
        assert_eq!(order, vec!["a", "b", "a", "b", "a"]);
        assert!(ReviewDataset::default().next_review().is_none());
    }

    #[test]
    fn test_missing_shard_is_empty() {
        let dir = fixture();
        let dataset = ReviewDataset::load(dir.path(), &participant_id(7)).unwrap();
        assert!(dataset.is_empty());
    }

    #[tokio::test]
    async fn test_client_replays_shards() {
        let dir = fixture();
        let client = DatasetParticipantClient::load(dir.path()).unwrap();
        assert_eq!(client.population(), vec![participant_id(0), participant_id(1)]);

        let request = DispatchRequest {
            epoch_id: 0,
            requesting_participant_count: 2,
        };
        let first = client
            .request_review(&participant_id(0), &request)
            .await
            .unwrap()
            .unwrap();
        let second = client
            .request_review(&participant_id(0), &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.paper_id.as_deref(), Some("p1"));
        assert_eq!(second.paper_id.as_deref(), Some("p2"));
        assert_eq!(first.participant_id, "miner_0");

        let unknown = client
            .request_review(&ParticipantId::new("stranger"), &request)
            .await
            .unwrap();
        assert!(unknown.is_none());
    }

    #[test]
    fn test_summary_counts_orphans() {
        let dir = fixture();
        let summary = summarize(dir.path()).unwrap();
        assert_eq!(summary.catalog_papers, 2);
        assert_eq!(summary.reviews_loaded[&participant_id(0)], 2);
        assert_eq!(summary.unknown_paper_reviews, 1);
    }
}

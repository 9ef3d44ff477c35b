//! Dispatch wire types, submissions, and the per-epoch submission store.

use std::collections::BTreeMap;
use std::sync::Arc;

use peerrank_state::ParticipantId;
use serde::{Deserialize, Serialize};

use super::paper::{Paper, PaperCatalog};
use super::review::{Grade, Review};

/// Request sent to every sampled participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub epoch_id: u64,
    pub requesting_participant_count: usize,
}

/// A participant's reply. Every field is optional on the wire; shape checks
/// happen in [`DispatchResponse::into_submission`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub participant_id: String,
    #[serde(default)]
    pub paper_id: Option<String>,
    #[serde(default)]
    pub review_id: Option<String>,
    #[serde(default)]
    pub review_text: Option<String>,
    #[serde(default)]
    pub rating: Option<Grade>,
    #[serde(default)]
    pub confidence: Option<Grade>,
    #[serde(default)]
    pub reviewer_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Why a response was treated as a non-response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseRejection {
    #[error("empty participant id")]
    EmptyParticipantId,

    #[error("response from {actual} answered a request sent to {expected}")]
    ParticipantMismatch { expected: String, actual: String },

    #[error("missing paper id")]
    MissingPaperId,

    #[error("missing review text")]
    MissingText,

    #[error("review text has {len} chars, limit is {max}")]
    TextTooLong { len: usize, max: usize },
}

impl DispatchResponse {
    /// Shape-check the reply and turn it into a [`Submission`].
    pub fn into_submission(
        self,
        expected: &ParticipantId,
        max_text_chars: usize,
    ) -> Result<Submission, ResponseRejection> {
        let participant = ParticipantId::new(self.participant_id);
        if participant.is_blank() {
            return Err(ResponseRejection::EmptyParticipantId);
        }
        if &participant != expected {
            return Err(ResponseRejection::ParticipantMismatch {
                expected: expected.to_string(),
                actual: participant.to_string(),
            });
        }

        let paper_id = self
            .paper_id
            .filter(|p| !p.trim().is_empty())
            .ok_or(ResponseRejection::MissingPaperId)?;
        let review_text = self
            .review_text
            .filter(|t| !t.trim().is_empty())
            .ok_or(ResponseRejection::MissingText)?;

        let len = review_text.chars().count();
        if len > max_text_chars {
            return Err(ResponseRejection::TextTooLong {
                len,
                max: max_text_chars,
            });
        }

        Ok(Submission {
            participant,
            review: Review {
                review_id: self.review_id.unwrap_or_default(),
                paper_id,
                review_text,
                rating: self.rating,
                confidence: self.confidence,
                reviewer_id: self.reviewer_id.unwrap_or_default(),
                metadata: self.metadata,
            },
        })
    }
}

/// One participant's review for one epoch. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub participant: ParticipantId,
    pub review: Review,
}

/// A submission dropped because its paper is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedSubmission {
    pub participant: ParticipantId,
    pub paper_id: String,
}

/// One epoch's accepted submissions, grouped by paper.
///
/// Only submissions whose paper is in the catalog are admitted, so every
/// stored submission references a known paper.
#[derive(Debug, Clone)]
pub struct SubmissionStore {
    catalog: Arc<PaperCatalog>,
    groups: BTreeMap<String, Vec<Submission>>,
    dropped: Vec<DroppedSubmission>,
}

impl SubmissionStore {
    pub fn new(catalog: Arc<PaperCatalog>) -> Self {
        Self {
            catalog,
            groups: BTreeMap::new(),
            dropped: Vec::new(),
        }
    }

    /// Admit a submission, or record it as dropped when its paper is unknown.
    pub fn admit(&mut self, submission: Submission) -> Result<(), DroppedSubmission> {
        if !self.catalog.contains(&submission.review.paper_id) {
            let dropped = DroppedSubmission {
                participant: submission.participant,
                paper_id: submission.review.paper_id,
            };
            self.dropped.push(dropped.clone());
            return Err(dropped);
        }
        self.groups
            .entry(submission.review.paper_id.clone())
            .or_default()
            .push(submission);
        Ok(())
    }

    pub fn paper(&self, paper_id: &str) -> Option<&Paper> {
        self.catalog.get(paper_id)
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<Submission>> {
        &self.groups
    }

    pub fn into_groups(self) -> BTreeMap<String, Vec<Submission>> {
        self.groups
    }

    pub fn dropped(&self) -> &[DroppedSubmission] {
        &self.dropped
    }

    pub fn submission_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

//! Review records and numeric-or-ordinal grades.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A rating or confidence as found in review archives: either a number or an
/// ordinal label such as `"6: marginally above the acceptance threshold"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Grade {
    Numeric(f64),
    Ordinal(String),
}

impl Grade {
    /// Numeric value of the grade; ordinal labels contribute their leading
    /// number, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            Grade::Numeric(v) => v.is_finite().then_some(*v),
            Grade::Ordinal(label) => leading_number(label),
        }
    }
}

fn leading_number(label: &str) -> Option<f64> {
    let trimmed = label.trim_start();
    let end = trimmed
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*c == '.' && *i > 0)))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end]
        .trim_end_matches('.')
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// An immutable source review.
///
/// Fields the validator does not interpret (title, summary, strengths, ...)
/// are kept in `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub review_id: String,

    pub paper_id: String,

    #[serde(default)]
    pub review_text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Grade>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Grade>,

    #[serde(default)]
    pub reviewer_id: String,

    #[serde(flatten)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Review {
    pub fn new(paper_id: impl Into<String>, review_text: impl Into<String>) -> Self {
        Self {
            review_id: String::new(),
            paper_id: paper_id.into(),
            review_text: review_text.into(),
            rating: None,
            confidence: None,
            reviewer_id: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_reviewer(mut self, reviewer_id: impl Into<String>) -> Self {
        self.reviewer_id = reviewer_id.into();
        self
    }

    pub fn with_rating(mut self, rating: Grade) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_confidence(mut self, confidence: Grade) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Rating scaled by the reviewer's confidence, used to order reviews
    /// whose rubric aggregates tie.
    ///
    /// `None` when the rating has no numeric value; a missing confidence
    /// counts as 1.
    pub fn confidence_weighted_rating(&self) -> Option<f64> {
        let rating = self.rating.as_ref()?.value()?;
        let confidence = self
            .confidence
            .as_ref()
            .and_then(Grade::value)
            .unwrap_or(1.0);
        Some(rating * confidence)
    }
}

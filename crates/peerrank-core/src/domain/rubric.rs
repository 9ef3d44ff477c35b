//! Rubric definition, validation of evaluator output, and aggregation.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::fingerprint::Fingerprint;

/// Raw per-criterion scores as returned by an evaluator.
pub type CriterionScores = BTreeMap<String, f64>;

/// Tolerance for the weight-sum check.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// One named, weighted scoring criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub weight: f64,
    /// Guidance shown to the evaluator.
    #[serde(default)]
    pub description: String,
}

impl Criterion {
    pub fn new(name: &str, weight: f64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            weight,
            description: description.to_string(),
        }
    }
}

/// The fixed set of weighted criteria applied to every review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub criteria: Vec<Criterion>,
    /// Lowest admissible sub-score (inclusive).
    pub min_score: f64,
    /// Highest admissible sub-score (inclusive).
    pub max_score: f64,
}

impl Default for Rubric {
    fn default() -> Self {
        Self {
            criteria: vec![
                Criterion::new(
                    "comprehension",
                    0.20,
                    "Does the reviewer demonstrate understanding of the paper's core contributions?",
                ),
                Criterion::new(
                    "technical_depth",
                    0.25,
                    "Does the review engage with technical details and methodology?",
                ),
                Criterion::new(
                    "specificity",
                    0.20,
                    "Are criticisms and praise specific, with examples?",
                ),
                Criterion::new(
                    "constructiveness",
                    0.15,
                    "Does the review give the authors clear, actionable suggestions?",
                ),
                Criterion::new(
                    "evidence_based",
                    0.15,
                    "Are claims supported by evidence from the paper?",
                ),
                Criterion::new(
                    "professionalism",
                    0.05,
                    "Is the tone respectful and appropriate?",
                ),
            ],
            min_score: 0.0,
            max_score: 5.0,
        }
    }
}

impl Rubric {
    /// Rubric whose criteria all share the same weight.
    pub fn uniform(names: &[&str], min_score: f64, max_score: f64) -> Self {
        let weight = 1.0 / names.len().max(1) as f64;
        Self {
            criteria: names
                .iter()
                .map(|n| Criterion::new(n, weight, ""))
                .collect(),
            min_score,
            max_score,
        }
    }

    /// Check names, scale and weight vector. A failure here is fatal at
    /// startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.criteria.is_empty() {
            return Err(ConfigError::InvalidRubric("no criteria".to_string()));
        }
        if !(self.min_score.is_finite() && self.max_score.is_finite())
            || self.min_score >= self.max_score
        {
            return Err(ConfigError::InvalidRubric(format!(
                "score range [{}, {}] is empty",
                self.min_score, self.max_score
            )));
        }

        let mut seen = HashSet::new();
        for c in &self.criteria {
            if c.name.trim().is_empty() {
                return Err(ConfigError::InvalidRubric("blank criterion name".to_string()));
            }
            if !seen.insert(c.name.as_str()) {
                return Err(ConfigError::InvalidRubric(format!(
                    "duplicate criterion '{}'",
                    c.name
                )));
            }
            if !c.weight.is_finite() || c.weight < 0.0 {
                return Err(ConfigError::InvalidRubric(format!(
                    "criterion '{}' has invalid weight {}",
                    c.name, c.weight
                )));
            }
        }

        let total: f64 = self.criteria.iter().map(|c| c.weight).sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::InvalidRubric(format!(
                "criterion weights must sum to 1.0, got {total}"
            )));
        }
        Ok(())
    }

    /// Content fingerprint of the rubric definition.
    pub fn fingerprint(&self) -> Fingerprint {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        Fingerprint::compute(&canonical)
    }

    pub fn criterion_names(&self) -> impl Iterator<Item = &str> {
        self.criteria.iter().map(|c| c.name.as_str())
    }

    /// Validate raw evaluator output and aggregate it.
    ///
    /// Rejects when a criterion is missing or a sub-score is outside
    /// `[min_score, max_score]`. Keys that are not criteria are ignored.
    pub fn assess(&self, fingerprint: Fingerprint, raw: &CriterionScores) -> RubricScore {
        let mut sub_scores = BTreeMap::new();
        let mut aggregate = 0.0;

        for c in &self.criteria {
            let Some(&value) = raw.get(&c.name) else {
                let reason = format!("missing criterion '{}'", c.name);
                return RubricScore::rejected(fingerprint, reason);
            };
            if !value.is_finite() || value < self.min_score || value > self.max_score {
                return RubricScore::rejected(
                    fingerprint,
                    format!(
                        "criterion '{}' scored {} outside [{}, {}]",
                        c.name, value, self.min_score, self.max_score
                    ),
                );
            }
            aggregate += c.weight * value;
            sub_scores.insert(c.name.clone(), value);
        }

        RubricScore {
            fingerprint,
            sub_scores,
            aggregate,
            valid: true,
            rejection: None,
        }
    }

    /// System prompt describing the rubric to an LLM evaluator.
    pub fn render_prompt(&self) -> String {
        let scale = format!("{}-{}", fmt_num(self.min_score), fmt_num(self.max_score));
        let mut prompt = String::from(
            "You are an expert peer review evaluator for academic conferences.\n\n\
             Your task is to evaluate the quality of a peer review using a structured rubric.\n\n",
        );
        prompt.push_str(&format!(
            "Evaluate the review on these criteria ({scale} scale each):\n\n"
        ));
        for (i, c) in self.criteria.iter().enumerate() {
            prompt.push_str(&format!("{}. **{}** ({scale}): {}\n", i + 1, c.name, c.description));
        }
        prompt.push_str("\nReturn your evaluation as JSON with this exact structure:\n{\n");
        for c in &self.criteria {
            prompt.push_str(&format!("  \"{}\": <{scale}>,\n", c.name));
        }
        prompt.push_str("  \"justification\": \"<brief explanation of scores>\"\n}\n\n");
        prompt.push_str(
            "Be rigorous. Most reviews should land in the middle of the scale. \
             Top scores are rare and must be earned.",
        );
        prompt
    }
}

fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Validated, aggregated rubric result for one review text.
///
/// `fingerprint` ties the score to the (rubric, review text) pair that
/// produced it. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricScore {
    pub fingerprint: Fingerprint,
    pub sub_scores: BTreeMap<String, f64>,
    /// Weighted sum of sub-scores; 0 when invalid.
    pub aggregate: f64,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
}

impl RubricScore {
    pub fn rejected(fingerprint: Fingerprint, reason: impl Into<String>) -> Self {
        Self {
            fingerprint,
            sub_scores: BTreeMap::new(),
            aggregate: 0.0,
            valid: false,
            rejection: Some(reason.into()),
        }
    }
}

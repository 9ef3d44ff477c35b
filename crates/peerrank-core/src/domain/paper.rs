//! Papers and the per-epoch paper catalog.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A paper that reviews are written about. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    #[serde(default)]
    pub paper_id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, rename = "abstract")]
    pub abstract_text: String,

    /// Venue the paper was submitted to (e.g. `ICLR.cc/2023/Conference`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,

    /// Final decision label, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
}

impl Paper {
    pub fn new(paper_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            title: title.into(),
            abstract_text: String::new(),
            venue: None,
            decision: None,
        }
    }
}

/// Papers known to the validator, keyed by paper id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaperCatalog {
    papers: BTreeMap<String, Paper>,
}

impl PaperCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_papers(papers: impl IntoIterator<Item = Paper>) -> Self {
        Self {
            papers: papers
                .into_iter()
                .map(|p| (p.paper_id.clone(), p))
                .collect(),
        }
    }

    /// Add a paper; an existing entry with the same id is kept.
    pub fn insert(&mut self, paper: Paper) {
        self.papers.entry(paper.paper_id.clone()).or_insert(paper);
    }

    pub fn get(&self, paper_id: &str) -> Option<&Paper> {
        self.papers.get(paper_id)
    }

    pub fn contains(&self, paper_id: &str) -> bool {
        self.papers.contains_key(paper_id)
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Paper> {
        self.papers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paper_deserializes_preprocessor_metadata() {
        let json = r#"{"paper_id": "p1", "title": "Attention", "abstract": "We propose..."}"#;
        let paper: Paper = serde_json::from_str(json).unwrap();
        assert_eq!(paper.paper_id, "p1");
        assert_eq!(paper.abstract_text, "We propose...");
        assert!(paper.venue.is_none());
        assert!(paper.decision.is_none());
    }

    #[test]
    fn test_catalog_keeps_first_insert() {
        let mut catalog = PaperCatalog::new();
        catalog.insert(Paper::new("p1", "first"));
        catalog.insert(Paper::new("p1", "second"));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("p1").unwrap().title, "first");
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = PaperCatalog::from_papers(vec![Paper::new("a", "A"), Paper::new("b", "B")]);
        assert!(catalog.contains("a"));
        assert!(!catalog.contains("c"));
        assert_eq!(catalog.iter().count(), 2);
    }
}

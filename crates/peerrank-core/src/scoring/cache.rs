//! Fingerprint-keyed cache of rubric scores.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::{Fingerprint, RubricScore};

/// Shared score cache.
///
/// Lookups may run concurrently. When two writers race on one fingerprint
/// the first stored score wins and both callers get it back from
/// [`ScoreCache::insert`].
#[async_trait]
pub trait ScoreCache: Send + Sync {
    async fn get(&self, fingerprint: &Fingerprint) -> Option<RubricScore>;

    /// Store `score` unless an entry exists; returns the stored entry.
    async fn insert(&self, score: RubricScore) -> RubricScore;
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryScoreCache {
    entries: RwLock<HashMap<Fingerprint, RubricScore>>,
}

impl MemoryScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ScoreCache for MemoryScoreCache {
    async fn get(&self, fingerprint: &Fingerprint) -> Option<RubricScore> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(fingerprint).cloned()
    }

    async fn insert(&self, score: RubricScore) -> RubricScore {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(score.fingerprint)
            .or_insert(score)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn score(fp: Fingerprint, aggregate: f64) -> RubricScore {
        RubricScore {
            fingerprint: fp,
            sub_scores: BTreeMap::new(),
            aggregate,
            valid: true,
            rejection: None,
        }
    }

    #[tokio::test]
    async fn test_first_writer_wins() {
        let cache = MemoryScoreCache::new();
        let fp = Fingerprint::compute(b"text");

        let first = cache.insert(score(fp, 3.0)).await;
        let second = cache.insert(score(fp, 4.0)).await;

        assert_eq!(first.aggregate, 3.0);
        assert_eq!(second.aggregate, 3.0);
        assert_eq!(cache.get(&fp).await.unwrap().aggregate, 3.0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_writers_agree_on_one_score() {
        let cache = Arc::new(MemoryScoreCache::new());
        let fp = Fingerprint::compute(b"contended");

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            tasks.spawn(async move { cache.insert(score(fp, i as f64)).await });
        }
        let mut returned = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            returned.push(joined.unwrap().aggregate);
        }

        let stored = cache.get(&fp).await.unwrap().aggregate;
        assert!((0..16).any(|i| i as f64 == stored));
        assert!(returned.iter().all(|&a| a == stored));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_miss() {
        let cache = MemoryScoreCache::new();
        assert!(cache.get(&Fingerprint::compute(b"absent")).await.is_none());
        assert!(cache.is_empty());
    }
}

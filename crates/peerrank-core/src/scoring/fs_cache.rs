use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::warn;

use super::cache::ScoreCache;
use crate::domain::{Fingerprint, RubricScore};

/// Filesystem-backed score cache with 2-char sharding.
///
/// Layout: `<root>/<first 2 hex chars>/<remaining hex chars>.json`
///
/// The cache is an optimisation: unreadable entries are treated as misses
/// and failed writes only log a warning.
#[derive(Debug, Clone)]
pub struct FsScoreCache {
    root: PathBuf,
}

impl FsScoreCache {
    /// Create a cache rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        let hex = fingerprint.to_hex();
        self.root.join(&hex[..2]).join(format!("{}.json", &hex[2..]))
    }

    async fn read_entry(path: &Path) -> Option<RubricScore> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "score cache read failed");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(score) => Some(score),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt score cache entry");
                None
            }
        }
    }

    /// Write unless the entry exists. `Ok(false)` means another writer got
    /// there first.
    fn write_entry(path: &Path, bytes: &[u8]) -> std::io::Result<bool> {
        let shard_dir = match path.parent() {
            Some(dir) => dir,
            None => return Ok(false),
        };
        std::fs::create_dir_all(shard_dir)?;

        let mut tmp = NamedTempFile::new_in(shard_dir)?;
        tmp.write_all(bytes)?;
        match tmp.persist_noclobber(path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.error),
        }
    }
}

#[async_trait]
impl ScoreCache for FsScoreCache {
    async fn get(&self, fingerprint: &Fingerprint) -> Option<RubricScore> {
        let score = Self::read_entry(&self.entry_path(fingerprint)).await?;
        (score.fingerprint == *fingerprint).then_some(score)
    }

    async fn insert(&self, score: RubricScore) -> RubricScore {
        let path = self.entry_path(&score.fingerprint);
        let written = match serde_json::to_vec_pretty(&score) {
            Ok(bytes) => {
                let target = path.clone();
                tokio::task::spawn_blocking(move || Self::write_entry(&target, &bytes))
                    .await
                    .unwrap_or_else(|e| Err(std::io::Error::other(e)))
            }
            Err(e) => Err(std::io::Error::other(e)),
        };

        match written {
            Ok(true) => score,
            Ok(false) => Self::read_entry(&path).await.unwrap_or(score),
            Err(e) => {
                warn!(
                    fingerprint = %score.fingerprint.short(),
                    error = %e,
                    "score cache write failed"
                );
                score
            }
        }
    }
}

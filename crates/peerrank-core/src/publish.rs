//! Hand-off of normalized weights at the end of each epoch.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use peerrank_state::ParticipantId;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

/// Receives the weight vector derived from the ledger.
#[async_trait]
pub trait WeightPublisher: Send + Sync {
    async fn publish(
        &self,
        epoch: u64,
        weights: &BTreeMap<ParticipantId, f64>,
    ) -> anyhow::Result<()>;
}

/// Logs the weight vector.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

#[async_trait]
impl WeightPublisher for TracingPublisher {
    async fn publish(
        &self,
        epoch: u64,
        weights: &BTreeMap<ParticipantId, f64>,
    ) -> anyhow::Result<()> {
        for (participant, weight) in weights {
            info!(event = "weights.entry", epoch, participant = %participant, weight);
        }
        info!(event = "weights.published", epoch, participants = weights.len());
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WeightsDocument<'a> {
    epoch: u64,
    published_at: String,
    weights: &'a BTreeMap<ParticipantId, f64>,
}

/// Writes the latest weights to a JSON file, replaced atomically.
#[derive(Debug, Clone)]
pub struct JsonFileWeightPublisher {
    path: PathBuf,
}

impl JsonFileWeightPublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl WeightPublisher for JsonFileWeightPublisher {
    async fn publish(
        &self,
        epoch: u64,
        weights: &BTreeMap<ParticipantId, f64>,
    ) -> anyhow::Result<()> {
        let doc = WeightsDocument {
            epoch,
            published_at: Utc::now().to_rfc3339(),
            weights,
        };
        let mut bytes = serde_json::to_vec_pretty(&doc)?;
        bytes.push(b'\n');

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir)?;
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .context("weights writer task failed")?
        .with_context(|| format!("failed to write weights to {}", self.path.display()))?;

        info!(event = "weights.published", epoch, path = %self.path.display());
        Ok(())
    }
}

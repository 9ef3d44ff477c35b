use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::StateError;
use crate::storage_traits::{LedgerSnapshot, LedgerStore};
use crate::Result;

/// Ledger persisted as a single JSON file.
///
/// Writes go to a temp file in the same directory which is then renamed over
/// the target, so readers see either the old or the new snapshot, never a
/// partial one.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    async fn load(&self) -> Result<Option<LedgerSnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no ledger file yet, starting empty");
                return Ok(None);
            }
            Err(e) => return Err(self.io_err(e)),
        };

        let snapshot = LedgerSnapshot::decode(&bytes).map_err(|e| match e {
            StateError::Serialization(reason) => StateError::Corrupt {
                path: self.path.clone(),
                reason,
            },
            other => other,
        })?;

        debug!(
            path = %self.path.display(),
            participants = snapshot.participants.len(),
            last_epoch = ?snapshot.last_epoch,
            "ledger loaded"
        );
        Ok(Some(snapshot))
    }

    async fn persist(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let bytes = snapshot.encode()?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || Self::write_atomic(&path, &bytes))
            .await
            .map_err(|e| self.io_err(std::io::Error::other(e)))?
            .map_err(|e| self.io_err(e))?;

        debug!(
            path = %self.path.display(),
            participants = snapshot.participants.len(),
            "ledger persisted"
        );
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "ledger reset");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

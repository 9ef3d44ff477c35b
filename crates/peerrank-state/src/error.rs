//! Error types for peerrank-state

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the ledger persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Filesystem error while reading or replacing the ledger file
    #[error("Ledger I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The ledger file exists but cannot be trusted
    #[error("Ledger file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// The ledger file was written by an incompatible version
    #[error("Unsupported ledger format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// A participant record violates the ledger invariants
    #[error("Invalid state for participant {participant}: {reason}")]
    InvalidRecord { participant: String, reason: String },

    /// Injected failure (fakes only)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

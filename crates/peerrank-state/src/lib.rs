//! PeerRank-State: durable participant score state
//!
//! This crate owns the only artifact of the validator pipeline that outlives
//! a process: the per-participant EMA ledger.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: atomic writes, deterministic encoding, refusing to invent state.
//!
//! ## Key Components
//!
//! - `LedgerStore`: load/persist contract for a [`LedgerSnapshot`]
//! - `FileLedgerStore`: single JSON file, replaced atomically
//! - `fakes::MemoryLedgerStore`: in-memory store for tests

mod error;
pub mod fakes;
mod file_store;
pub mod storage_traits;

pub use error::StateError;
pub use file_store::FileLedgerStore;
pub use storage_traits::{
    LedgerSnapshot, LedgerStore, ParticipantId, ParticipantScoreState, LEDGER_FORMAT_VERSION,
};

/// Result type for peerrank-state operations
pub type Result<T> = std::result::Result<T, StateError>;

//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryLedgerStore` keeps the encoded snapshot bytes, so it exercises the
//! same encode/decode path as the file store without touching disk.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StateError;
use crate::storage_traits::{LedgerSnapshot, LedgerStore};
use crate::Result;

// ---------------------------------------------------------------------------
// MemoryLedgerStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    bytes: Mutex<Option<Vec<u8>>>,
    persists: AtomicUsize,
    fail_persist: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with raw bytes (e.g. to simulate a corrupt file).
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let store = Self::default();
        *store.bytes.lock().unwrap() = Some(bytes.into());
        store
    }

    /// Make every subsequent `persist` fail.
    pub fn fail_persists(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `persist` calls.
    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }

    /// Raw bytes of the last persisted snapshot.
    pub fn raw(&self) -> Option<Vec<u8>> {
        self.bytes.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> Result<Option<LedgerSnapshot>> {
        let bytes = self.bytes.lock().unwrap().clone();
        match bytes {
            None => Ok(None),
            Some(b) => LedgerSnapshot::decode(&b).map(Some),
        }
    }

    async fn persist(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(StateError::Unavailable("injected persist failure".to_string()));
        }
        let encoded = snapshot.encode()?;
        *self.bytes.lock().unwrap() = Some(encoded);
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        *self.bytes.lock().unwrap() = None;
        Ok(())
    }
}

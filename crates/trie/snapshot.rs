use crate::db::KvStore;
use crate::error::AnalysisError;
use std::collections::HashMap;
use std::sync::Mutex;

/// A deduplicating, hash-keyed buffer of blobs reachable from a trie root,
/// flushed to a destination store in one transactional write (§4.4).
///
/// Entries are appended from any traversal thread; `commit` is only ever
/// called once all traversal threads have joined.
#[derive(Default)]
pub struct SnapshotBuffer {
    entries: Mutex<HashMap<[u8; 32], Vec<u8>>>,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insertion. The SMT guarantees hash -> content uniqueness,
    /// so two inserts under the same key are expected to carry identical
    /// bytes; this does not re-verify that on every insert.
    pub fn record(&self, hash: [u8; 32], blob: Vec<u8>) -> Result<(), AnalysisError> {
        let mut entries = self.entries.lock().map_err(|_| AnalysisError::LockPoisoned)?;
        entries.entry(hash).or_insert(blob);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes every buffered entry to `dst` in one transaction and drains
    /// the buffer. Calling this twice is harmless (the second call writes
    /// nothing) but each caller should only do so once per §4.4.
    pub fn commit(&self, dst: &dyn KvStore) -> Result<(), AnalysisError> {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock().map_err(|_| AnalysisError::LockPoisoned)?;
            entries.drain().collect()
        };
        if drained.is_empty() {
            return Ok(());
        }
        dst.put_batch(drained)
            .map_err(|e| AnalysisError::StoreWriteFailure(e.to_string()))
    }
}

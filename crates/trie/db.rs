use crate::error::AnalysisError;
use std::{
    collections::HashMap,
    panic::RefUnwindSafe,
    sync::{Arc, Mutex},
};

/// A byte-addressable key-value store with batched transactional writes.
///
/// Implementations must tolerate concurrent calls to `get` from multiple
/// traversal threads; `put_batch` is only ever called after every reader
/// thread has joined.
pub trait KvStore: Send + Sync + RefUnwindSafe {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, AnalysisError>;
    fn put_batch(&self, entries: Vec<([u8; 32], Vec<u8>)>) -> Result<(), AnalysisError>;
}

/// In-memory reference implementation of [`KvStore`], used by this crate's
/// own tests and as a destination store for snapshotting in-process.
#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    inner: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>) -> Self {
        Self { inner: map }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, AnalysisError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| AnalysisError::LockPoisoned)?
            .get(key)
            .cloned())
    }

    fn put_batch(&self, entries: Vec<([u8; 32], Vec<u8>)>) -> Result<(), AnalysisError> {
        let mut db = self.inner.lock().map_err(|_| AnalysisError::LockPoisoned)?;
        for (key, value) in entries {
            db.insert(key.to_vec(), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_put_round_trip() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.get(b"missing").unwrap(), None);
        store
            .put_batch(vec![([7u8; 32], b"value".to_vec())])
            .unwrap();
        assert_eq!(store.get(&[7u8; 32]).unwrap(), Some(b"value".to_vec()));
        assert_eq!(store.len(), 1);
    }
}

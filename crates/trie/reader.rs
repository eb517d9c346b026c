use crate::codec::{classify, decode_batch, Batch, NodeId, SlotKind};
use crate::db::KvStore;
use crate::error::AnalysisError;
use crate::snapshot::SnapshotBuffer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Navigates the batched trie layout, fetching batches from the source
/// store on demand (§4.2).
///
/// Shared (via `Arc`) across every recursive descent of a single `Dfs`
/// call, and across the contract-storage sub-traversals it spawns, so that
/// `load_db_counter` and the batch capture buffer aggregate over the whole
/// invocation.
pub struct TrieReader {
    store: Arc<dyn KvStore>,
    load_db_counter: Option<AtomicU64>,
    /// Independent capture of every batch blob fetched from disk, flushed
    /// to the destination store separately from the leaf/code buffer.
    batch_capture: Option<SnapshotBuffer>,
}

/// What `load_children` found at a given `(node_id, height, iBatch)` position.
pub struct Children {
    pub batch: Arc<Batch>,
    pub i_batch: usize,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    pub is_shortcut: bool,
}

impl TrieReader {
    pub fn new(store: Arc<dyn KvStore>, count_db_reads: bool, capture_batches: bool) -> Self {
        TrieReader {
            store,
            load_db_counter: count_db_reads.then(|| AtomicU64::new(0)),
            batch_capture: capture_batches.then(SnapshotBuffer::new),
        }
    }

    pub fn load_db_counter(&self) -> u64 {
        self.load_db_counter
            .as_ref()
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn batch_capture(&self) -> Option<&SnapshotBuffer> {
        self.batch_capture.as_ref()
    }

    /// Looks for the children of `node_id` at `(height, iBatch)`, fetching a
    /// fresh batch from storage whenever a batch boundary is crossed.
    pub fn load_children(
        &self,
        node_id: NodeId,
        height: u64,
        i_batch: usize,
        current_batch: Option<&Arc<Batch>>,
    ) -> Result<Children, AnalysisError> {
        if height % 4 == 0 {
            let batch = if node_id.is_empty() {
                Arc::new(Batch::default_empty())
            } else {
                Arc::new(self.fetch_batch(node_id)?)
            };
            let is_shortcut = batch.is_shortcut;
            let left = batch.left(0).copied();
            let right = batch.right(0).copied();
            Ok(Children {
                batch,
                i_batch: 0,
                left,
                right,
                is_shortcut,
            })
        } else {
            let batch = current_batch
                .expect("in-batch navigation requires a batch carried over from the caller")
                .clone();
            let is_shortcut = matches!(classify(batch.slot(i_batch)), SlotKind::Shortcut);
            let left = batch.left(i_batch).copied();
            let right = batch.right(i_batch).copied();
            Ok(Children {
                batch,
                i_batch,
                left,
                right,
                is_shortcut,
            })
        }
    }

    fn fetch_batch(&self, node_id: NodeId) -> Result<Batch, AnalysisError> {
        let hash = node_id.hash();
        let blob = self
            .store
            .get(&hash)?
            .ok_or_else(|| AnalysisError::StoreMissingNode(hex::encode(hash)))?;
        if let Some(counter) = &self.load_db_counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        let decoded = decode_batch(&blob)?;
        if let Some(capture) = &self.batch_capture {
            capture.record(hash, blob)?;
        }
        Ok(decoded)
    }
}

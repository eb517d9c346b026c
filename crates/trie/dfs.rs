use crate::account::classify_account;
use crate::codec::NodeId;
use crate::counters::{Counters, CountersSnapshot};
use crate::db::KvStore;
use crate::error::AnalysisError;
use crate::hash::{bit, hash_internal, hash_shortcut};
use crate::reader::TrieReader;
use crate::snapshot::SnapshotBuffer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::Scope;

const TRIE_HEIGHT: u64 = 256;

/// Whether a traversal walks the top-level general (account) trie or a
/// per-contract storage trie. The same recursive engine drives both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrieMode {
    General,
    Storage,
}

/// Outcome of a completed `analyse`/`snapshot`/`snapshot_account` call.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub counters: CountersSnapshot,
    pub load_db_counter: u64,
}

/// Entry point: builds a Trie Reader over `source` and drives the DFS
/// traversal for `Analyse`, `Snapshot`, and `SnapshotAccount` (§6.3).
pub struct StateAnalysis {
    source: Arc<dyn KvStore>,
    count_db_reads: bool,
    general_trie: bool,
    integrity_check: bool,
    max_thread: u64,
}

impl StateAnalysis {
    pub fn new(
        source: Arc<dyn KvStore>,
        count_db_reads: bool,
        general_trie: bool,
        integrity_check: bool,
        max_thread: u64,
    ) -> Self {
        StateAnalysis {
            source,
            count_db_reads,
            general_trie,
            integrity_check,
            max_thread,
        }
    }

    /// Traversal without write side effects.
    pub fn analyse(&self, root: [u8; 32]) -> Result<AnalysisOutcome, AnalysisError> {
        self.run(root, None, None)
    }

    /// Traversal plus a full copy of every reachable node, leaf, contract
    /// storage trie, and contract code into `dst`.
    pub fn snapshot(
        &self,
        dst: Arc<dyn KvStore>,
        root: [u8; 32],
    ) -> Result<AnalysisOutcome, AnalysisError> {
        self.run(root, Some(dst), None)
    }

    /// Copies only the single path from `root` to the leaf addressed by
    /// `account_key`, that leaf's payload, and (if it is a contract) its
    /// storage trie and code.
    pub fn snapshot_account(
        &self,
        dst: Arc<dyn KvStore>,
        root: [u8; 32],
        account_key: [u8; 32],
    ) -> Result<AnalysisOutcome, AnalysisError> {
        self.run(root, Some(dst), Some(account_key))
    }

    fn run(
        &self,
        root_hash: [u8; 32],
        dst: Option<Arc<dyn KvStore>>,
        target_account_key: Option<[u8; 32]>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let snapshotting = dst.is_some();
        let reader = Arc::new(TrieReader::new(
            self.source.clone(),
            self.count_db_reads,
            snapshotting,
        ));
        let counters = Arc::new(Counters::new());
        let leaf_buffer = snapshotting.then(|| Arc::new(SnapshotBuffer::new()));

        let engine = Engine {
            store: self.source.clone(),
            reader: reader.clone(),
            counters: counters.clone(),
            mode: if self.general_trie {
                TrieMode::General
            } else {
                TrieMode::Storage
            },
            integrity_check: self.integrity_check,
            leaf_buffer: leaf_buffer.clone(),
            target_account_key,
            spawn_budget: Arc::new(AtomicU64::new(0)),
            max_thread: self.max_thread,
            dst: dst.clone(),
            count_db_reads: self.count_db_reads,
        };

        tracing::debug!(root = %hex::encode(root_hash), %snapshotting, "starting trie traversal");
        let root_id = NodeId::new(root_hash, false);
        std::thread::scope(|scope| engine.dfs(scope, root_id, 0, TRIE_HEIGHT, None))?;

        if let (Some(dst), Some(leaf_buffer)) = (&dst, &leaf_buffer) {
            leaf_buffer.commit(dst.as_ref())?;
            if let Some(capture) = reader.batch_capture() {
                capture.commit(dst.as_ref())?;
            }
        }

        let counters_snapshot = counters.snapshot()?;
        Ok(AnalysisOutcome {
            counters: counters_snapshot,
            load_db_counter: reader.load_db_counter(),
        })
    }
}

/// One recursive descent's shared, cloneable state. Cheap to clone: every
/// field is either `Arc`-backed or `Copy`.
#[derive(Clone)]
struct Engine {
    store: Arc<dyn KvStore>,
    reader: Arc<TrieReader>,
    counters: Arc<Counters>,
    mode: TrieMode,
    integrity_check: bool,
    leaf_buffer: Option<Arc<SnapshotBuffer>>,
    target_account_key: Option<[u8; 32]>,
    spawn_budget: Arc<AtomicU64>,
    max_thread: u64,
    dst: Option<Arc<dyn KvStore>>,
    count_db_reads: bool,
}

impl Engine {
    fn dfs<'scope>(
        &self,
        scope: &'scope Scope<'scope, '_>,
        node_id: NodeId,
        i_batch: usize,
        height: u64,
        batch: Option<Arc<crate::codec::Batch>>,
    ) -> Result<(), AnalysisError> {
        let children = self.reader.load_children(node_id, height, i_batch, batch.as_ref())?;

        if children.is_shortcut {
            return self.handle_shortcut(node_id, height, &children);
        }

        if self.integrity_check && !node_id.is_empty() {
            let left_hash = children.left.map(|n| n.hash());
            let right_hash = children.right.map(|n| n.hash());
            let expected = hash_internal(left_hash, right_hash);
            if expected != node_id.hash() {
                tracing::warn!(node = %hex::encode(node_id.hash()), "integrity failure at internal node");
                return Err(AnalysisError::IntegrityFailure(hex::encode(node_id.hash())));
            }
        }

        if let Some(account_key) = self.target_account_key {
            let bit_index = (TRIE_HEIGHT - height) as usize;
            let next_height = height - 1;
            let (selected, next_i_batch) = if bit(&account_key, bit_index) {
                (children.right, 2 * children.i_batch + 2)
            } else {
                (children.left, 2 * children.i_batch + 1)
            };
            let selected = selected.ok_or(AnalysisError::PathAbsent)?;
            return self.dfs(scope, selected, next_i_batch, next_height, Some(children.batch));
        }

        let next_height = height - 1;
        let left_i = 2 * children.i_batch + 1;
        let right_i = 2 * children.i_batch + 2;
        match (children.left, children.right) {
            (Some(left), Some(right)) => {
                let (left_result, right_result) = if self.try_reserve_spawn_budget() {
                    let left_engine = self.clone();
                    let right_engine = self.clone();
                    let left_batch = children.batch.clone();
                    let right_batch = children.batch.clone();
                    let left_handle = scope.spawn(move || {
                        left_engine.dfs(scope, left, left_i, next_height, Some(left_batch))
                    });
                    let right_handle = scope.spawn(move || {
                        right_engine.dfs(scope, right, right_i, next_height, Some(right_batch))
                    });
                    (
                        left_handle.join().expect("dfs worker thread panicked"),
                        right_handle.join().expect("dfs worker thread panicked"),
                    )
                } else {
                    let left_result =
                        self.dfs(scope, left, left_i, next_height, Some(children.batch.clone()));
                    let right_result =
                        self.dfs(scope, right, right_i, next_height, Some(children.batch.clone()));
                    (left_result, right_result)
                };
                left_result?;
                right_result?;
                Ok(())
            }
            (Some(left), None) => self.dfs(scope, left, left_i, next_height, Some(children.batch)),
            (None, Some(right)) => {
                self.dfs(scope, right, right_i, next_height, Some(children.batch))
            }
            (None, None) => Ok(()),
        }
    }

    /// Reserves two units of the process-wide spawn budget if available,
    /// returning whether the caller may spawn both children in parallel.
    fn try_reserve_spawn_budget(&self) -> bool {
        let mut current = self.spawn_budget.load(Ordering::Relaxed);
        loop {
            if current >= self.max_thread {
                return false;
            }
            match self.spawn_budget.compare_exchange_weak(
                current,
                current + 2,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    fn handle_shortcut(
        &self,
        node_id: NodeId,
        height: u64,
        children: &crate::reader::Children,
    ) -> Result<(), AnalysisError> {
        let key = children
            .left
            .map(|n| n.hash())
            .ok_or_else(|| AnalysisError::DecodeFailure("shortcut leaf missing key slot".into()))?;
        let value_key = children.right.map(|n| n.hash()).ok_or_else(|| {
            AnalysisError::DecodeFailure("shortcut leaf missing value-key slot".into())
        })?;

        if self.integrity_check {
            let expected = hash_shortcut(key, value_key, height);
            if expected != node_id.hash() {
                tracing::warn!(node = %hex::encode(node_id.hash()), "integrity failure at shortcut leaf");
                return Err(AnalysisError::IntegrityFailure(hex::encode(node_id.hash())));
            }
        }

        self.counters.observe_leaf_height(height);
        let raw = self.store.get(&value_key)?.unwrap_or_default();
        let snapshotting = self.leaf_buffer.is_some();

        match self.mode {
            TrieMode::General => {
                let outcome = classify_account(&raw, &self.counters)?;

                if snapshotting {
                    if let Some(target) = self.target_account_key {
                        if target != key {
                            return Err(AnalysisError::SnapshotPathMismatch);
                        }
                    }
                }

                if let Some(outcome) = outcome {
                    if snapshotting {
                        if let Some(storage_root) = outcome.storage_root {
                            self.snapshot_contract_storage(storage_root)?;
                        }
                        if let Some(code_hash) = outcome.code_hash {
                            let code = self.store.get(&code_hash)?.unwrap_or_default();
                            self.leaf_buffer
                                .as_ref()
                                .expect("snapshotting implies a leaf buffer")
                                .record(code_hash, code)?;
                        }
                    } else if self.integrity_check {
                        if let Some(storage_root) = outcome.storage_root {
                            self.verify_contract_storage(storage_root)?;
                        }
                    }
                }
            }
            TrieMode::Storage => {
                self.counters.record_storage_value();
            }
        }

        if let Some(buffer) = &self.leaf_buffer {
            buffer.record(value_key, raw)?;
        }

        Ok(())
    }

    /// Launches a child DFS engine over a contract's storage trie with
    /// snapshotting enabled, committing its buffers as soon as it returns
    /// rather than waiting for the top-level traversal to finish (§4.4).
    fn snapshot_contract_storage(&self, storage_root: [u8; 32]) -> Result<(), AnalysisError> {
        let dst = self
            .dst
            .clone()
            .expect("snapshotting a contract requires a destination store");
        let child_reader = Arc::new(TrieReader::new(self.store.clone(), self.count_db_reads, true));
        let child_leaf_buffer = Arc::new(SnapshotBuffer::new());
        let child = Engine {
            store: self.store.clone(),
            reader: child_reader.clone(),
            counters: self.counters.clone(),
            mode: TrieMode::Storage,
            integrity_check: self.integrity_check,
            leaf_buffer: Some(child_leaf_buffer.clone()),
            target_account_key: None,
            spawn_budget: self.spawn_budget.clone(),
            max_thread: self.max_thread,
            dst: Some(dst.clone()),
            count_db_reads: self.count_db_reads,
        };
        let root_id = NodeId::new(storage_root, false);
        std::thread::scope(|scope| child.dfs(scope, root_id, 0, TRIE_HEIGHT, None))?;
        child_leaf_buffer.commit(dst.as_ref())?;
        if let Some(capture) = child_reader.batch_capture() {
            capture.commit(dst.as_ref())?;
        }
        Ok(())
    }

    /// Launches a child DFS engine over a contract's storage trie with
    /// integrity checking only, no snapshot side effects.
    fn verify_contract_storage(&self, storage_root: [u8; 32]) -> Result<(), AnalysisError> {
        let child_reader = Arc::new(TrieReader::new(self.store.clone(), self.count_db_reads, false));
        let child = Engine {
            store: self.store.clone(),
            reader: child_reader,
            counters: self.counters.clone(),
            mode: TrieMode::Storage,
            integrity_check: true,
            leaf_buffer: None,
            target_account_key: None,
            spawn_budget: self.spawn_budget.clone(),
            max_thread: self.max_thread,
            dst: None,
            count_db_reads: self.count_db_reads,
        };
        let root_id = NodeId::new(storage_root, false);
        std::thread::scope(|scope| child.dfs(scope, root_id, 0, TRIE_HEIGHT, None))
    }
}

use crate::error::AnalysisError;
use num_bigint::BigUint;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Cumulative tallies produced by one `Analyse`/`Snapshot` invocation (§3.1).
///
/// Each scalar field is a field-wise atomic; the arbitrary-precision balance
/// total is guarded by a mutex, since there is no lock-free big-integer add.
pub struct Counters {
    nb_user_accounts: AtomicU64,
    nb_user_accounts0: AtomicU64,
    nb_contracts: AtomicU64,
    nb_nil_objects: AtomicU64,
    nb_storage_values: AtomicU64,
    cumulated_height: AtomicU64,
    min_observed_height: AtomicU64,
    total_leaf_count: AtomicU64,
    total_balance: Mutex<BigUint>,
}

/// A point-in-time, read-only view of [`Counters`], with the derived fields
/// (`deepest_leaf_height`, `average_depth`) computed once on completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub nb_user_accounts: u64,
    pub nb_user_accounts0: u64,
    pub nb_contracts: u64,
    pub nb_nil_objects: u64,
    pub nb_storage_values: u64,
    pub total_balance: BigUint,
    pub deepest_leaf_height: u64,
    pub average_depth: u64,
}

const TRIE_HEIGHT: u64 = 256;

impl Counters {
    pub fn new() -> Self {
        Counters {
            nb_user_accounts: AtomicU64::new(0),
            nb_user_accounts0: AtomicU64::new(0),
            nb_contracts: AtomicU64::new(0),
            nb_nil_objects: AtomicU64::new(0),
            nb_storage_values: AtomicU64::new(0),
            cumulated_height: AtomicU64::new(0),
            min_observed_height: AtomicU64::new(TRIE_HEIGHT),
            total_leaf_count: AtomicU64::new(0),
            total_balance: Mutex::new(BigUint::from(0u32)),
        }
    }

    pub fn record_user_account(&self) {
        self.nb_user_accounts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_user_account_zero(&self) {
        self.nb_user_accounts0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_contract(&self) {
        self.nb_contracts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_nil_object(&self) {
        self.nb_nil_objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_value(&self) {
        self.nb_storage_values.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_balance(&self, balance_be: &[u8]) -> Result<(), AnalysisError> {
        let amount = BigUint::from_bytes_be(balance_be);
        let mut total = self.total_balance.lock().map_err(|_| AnalysisError::LockPoisoned)?;
        *total += amount;
        Ok(())
    }

    /// Records a leaf observed at absolute trie `height`, feeding the derived
    /// `deepestLeaf`/`averageDepth` counters computed in [`Counters::snapshot`].
    pub fn observe_leaf_height(&self, height: u64) {
        self.cumulated_height.fetch_add(height, Ordering::Relaxed);
        self.total_leaf_count.fetch_add(1, Ordering::Relaxed);
        let mut observed = self.min_observed_height.load(Ordering::Relaxed);
        while height < observed {
            match self.min_observed_height.compare_exchange_weak(
                observed,
                height,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => observed = current,
            }
        }
    }

    pub fn snapshot(&self) -> Result<CountersSnapshot, AnalysisError> {
        let total_leaves = self.total_leaf_count.load(Ordering::Relaxed);
        let cumulated = self.cumulated_height.load(Ordering::Relaxed);
        let min_observed = self.min_observed_height.load(Ordering::Relaxed);
        let average_depth = if total_leaves == 0 {
            0
        } else {
            TRIE_HEIGHT - cumulated / total_leaves
        };
        let deepest_leaf_height = if total_leaves == 0 {
            0
        } else {
            TRIE_HEIGHT - min_observed
        };
        let total_balance = self.total_balance.lock().map_err(|_| AnalysisError::LockPoisoned)?.clone();
        Ok(CountersSnapshot {
            nb_user_accounts: self.nb_user_accounts.load(Ordering::Relaxed),
            nb_user_accounts0: self.nb_user_accounts0.load(Ordering::Relaxed),
            nb_contracts: self.nb_contracts.load(Ordering::Relaxed),
            nb_nil_objects: self.nb_nil_objects.load(Ordering::Relaxed),
            nb_storage_values: self.nb_storage_values.load(Ordering::Relaxed),
            total_balance,
            deepest_leaf_height,
            average_depth,
        })
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_accumulates_across_calls() {
        let counters = Counters::new();
        counters.add_balance(&[0x01, 0x00]).unwrap(); // 256
        counters.add_balance(&[0x01, 0x00]).unwrap(); // 256
        assert_eq!(counters.snapshot().unwrap().total_balance, BigUint::from(512u32));
    }

    #[test]
    fn deepest_leaf_tracks_minimum_height() {
        let counters = Counters::new();
        counters.observe_leaf_height(200);
        counters.observe_leaf_height(50);
        counters.observe_leaf_height(120);
        let snap = counters.snapshot().unwrap();
        assert_eq!(snap.deepest_leaf_height, 256 - 50);
        assert_eq!(snap.average_depth, 256 - (200 + 50 + 120) / 3);
    }

    #[test]
    fn empty_counters_have_zero_derived_fields() {
        let counters = Counters::new();
        let snap = counters.snapshot().unwrap();
        assert_eq!(snap.deepest_leaf_height, 0);
        assert_eq!(snap.average_depth, 0);
    }
}

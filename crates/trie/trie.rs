//! Analysis, integrity verification, and snapshotting of accounts and
//! contract storage held in a fixed-depth Sparse Merkle Trie.
//!
//! The trie is addressed by 256-bit keys and stored batched: every four
//! consecutive levels are packed into a single database value (see
//! [`codec`]). [`reader`] walks that layout, [`dfs`] drives the bounded-
//! concurrency traversal over it, and [`account`] interprets what a leaf's
//! payload means once reached.

pub mod account;
pub mod codec;
pub mod counters;
pub mod db;
pub mod dfs;
pub mod error;
pub mod hash;
pub mod reader;
pub mod snapshot;

pub use account::{AccountOutcome, AccountRecord};
pub use codec::{Batch, NodeId, SlotKind};
pub use counters::{Counters, CountersSnapshot};
pub use db::{InMemoryKvStore, KvStore};
pub use dfs::{AnalysisOutcome, StateAnalysis};
pub use error::AnalysisError;
pub use reader::{Children, TrieReader};
pub use snapshot::SnapshotBuffer;

/// Fixed depth of the trie: every key is 256 bits, one bit per level.
pub const TRIE_HEIGHT: u64 = 256;

/// A 32-byte SHA-256 digest, trie key, or storage-DB key.
pub type Hash = [u8; 32];

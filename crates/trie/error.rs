use thiserror::Error;

/// Errors surfaced by trie decoding, traversal, and snapshotting.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("the trie node {0} is unavailable in the disk db, db may be corrupted")]
    StoreMissingNode(String),
    #[error("failed to decode account record: {0}")]
    DecodeFailure(String),
    #[error("integrity failed at node {0}: recomputed hash does not match")]
    IntegrityFailure(String),
    #[error("lnode doesn't match requested account key snapshot")]
    SnapshotPathMismatch,
    #[error("nil node in the path: account not in general trie")]
    PathAbsent,
    #[error("failed to commit snapshot batch to destination store: {0}")]
    StoreWriteFailure(String),
    #[error("internal lock was poisoned by a panicking holder")]
    LockPoisoned,
}

//! Flattened, serializable representation of a captured object graph.
//!
//! # Invariants
//! - A leaf key lives in at most one of `values` / `references`.
//! - Every path stored in a branch carries that branch's scope.
//! - Branches are upsert-only during capture and read-only during restore.

mod branch;
mod leaf;
mod meta;

pub use branch::{BranchSaveData, GLOBAL_SCOPE, RootSaveData};
pub use leaf::LeafSaveData;
pub use meta::{ChecksumRecord, SaveMetaData};

/// Errors raised by save-data container invariants.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("key `{key}` already recorded for this node")]
    DuplicateKey { key: String },
    #[error("path scope `{actual}` does not match branch scope `{expected}`")]
    ScopeMismatch { expected: String, actual: String },
}

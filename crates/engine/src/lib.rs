//! Snapshot/restore engine for arbitrary, possibly cyclic object graphs.
//!
//! The capture side walks live nodes depth-first from declared roots,
//! assigning each shared instance exactly one [`GuidPath`] and flattening it
//! into a [`RootSaveData`] document. The restore side inverts the walk in two
//! passes: shells first (so every address resolves before any field is
//! populated), then a deferred patch queue that re-links references,
//! including cycles and forward references.
//!
//! # Invariants
//! - The seen-object table is consulted before recursing, never after, so
//!   cyclic graphs terminate by reusing the in-progress path.
//! - Every shell is registered in the identity table before its fields are
//!   touched.
//! - A capture error aborts the whole session; nothing partial is committed.

mod capture;
mod containers;
mod error;
mod node;
mod registry;
mod restore;

pub use capture::{CaptureSession, RootProvider, SaveRoot, SnapshotHandler, capture_all};
pub use error::SaveError;
pub use node::{NodeHandle, NodeRef, WeakHandle, node};
pub use registry::{Converter, ConverterRegistry, Saveable};
pub use restore::{
    DanglingReference, LoadMode, RestoreHandler, RestoreOptions, RestoreReport, RestoreSession,
};

pub use keepsake_common::{FORMAT_VERSION, GuidPath, SaveVersion};
pub use keepsake_data::{BranchSaveData, GLOBAL_SCOPE, LeafSaveData, RootSaveData};

use keepsake_common::GuidPath;

/// Errors raised by the snapshot/restore engine.
///
/// Capture-side errors abort the whole snapshot; restore-side errors are
/// fatal only when the payload itself cannot be honored (unknown type tag,
/// type mismatch). Dangling references are not errors; they are collected
/// into the restore report instead.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("no converter registered for type `{type_name}` at {path}")]
    UnsupportedType { type_name: String, path: GuidPath },

    #[error("payload names unknown node type `{tag}` at {path}")]
    UnknownTypeTag { tag: String, path: GuidPath },

    #[error("failed to encode `{key}` at {path}: {source}")]
    EncodeValue {
        path: GuidPath,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode `{key}` at {path}: {source}")]
    DecodeValue {
        path: GuidPath,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("node at {path} is mutably borrowed during capture")]
    NodeBorrowed { path: GuidPath },

    #[error("node at {path} is not a `{expected}`")]
    NodeTypeMismatch { path: GuidPath, expected: String },

    #[error("reference `{key}` of {owner} expected target {target} to be a `{expected}`")]
    PatchTypeMismatch {
        owner: GuidPath,
        key: String,
        target: GuidPath,
        expected: String,
    },

    #[error("owned value `{key}` at {path} escaped its restore call")]
    OwnedEscaped { path: GuidPath, key: String },

    #[error("fixed array `{key}` at {path} expected {expected} items, found {found}")]
    ArrayLength {
        path: GuidPath,
        key: String,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Data(#[from] keepsake_data::DataError),
}

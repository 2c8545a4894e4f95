//! Shared leaf types for the keepsake engine: graph addressing and format
//! versioning.
//!
//! # Invariants
//! - A [`GuidPath`] is immutable once minted and unique per logical node
//!   within one save operation.
//! - [`SaveVersion`] comparison is exact-match at the load gate; ordering is
//!   provided only for display and diagnostics.

mod path;
mod version;

pub use path::GuidPath;
pub use version::{FORMAT_VERSION, SaveVersion, VersionParseError};

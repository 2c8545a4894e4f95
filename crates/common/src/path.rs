use serde::{Deserialize, Serialize};
use std::fmt;

/// Hierarchical, content-stable address of a node in a saved graph.
///
/// A path is a scope name (one save unit, e.g. a loaded level, or the
/// reserved global scope) plus an ordered list of string segments. Equality
/// is structural, so the same logical node addresses identically across
/// save/load cycles. Paths are the sole cross-reference key: every persisted
/// edge is stored as the target's `GuidPath`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuidPath {
    scope: String,
    segments: Vec<String>,
}

impl GuidPath {
    /// Path of a declared root: one segment, the root's own stable id.
    pub fn root(scope: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            segments: vec![id.into()],
        }
    }

    /// Derive the address of a child node minted under a field key.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self {
            scope: self.scope.clone(),
            segments,
        }
    }

    /// Scope name this path lives in.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Ordered segment list, root id first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments; a root path has depth 1.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, i.e. the field key this node was minted under
    /// (or the root id for a depth-1 path).
    pub fn leaf_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl fmt::Display for GuidPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.segments.join("/"))
    }
}

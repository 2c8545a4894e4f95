use crate::{DataError, LeafSaveData};
use keepsake_common::{FORMAT_VERSION, GuidPath, SaveVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved scope name for scope-independent singletons.
pub const GLOBAL_SCOPE: &str = "global";

/// All captured leaves of one scope, keyed by path.
///
/// Uses BTreeMap so serialization order is deterministic across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSaveData {
    scope: String,
    leaves: BTreeMap<GuidPath, LeafSaveData>,
}

impl BranchSaveData {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            leaves: BTreeMap::new(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Insert or replace a leaf. The path's scope must match the branch.
    pub fn upsert(&mut self, path: GuidPath, leaf: LeafSaveData) -> Result<(), DataError> {
        if path.scope() != self.scope {
            return Err(DataError::ScopeMismatch {
                expected: self.scope.clone(),
                actual: path.scope().to_string(),
            });
        }
        self.leaves.insert(path, leaf);
        Ok(())
    }

    /// Remove a leaf. Exposed for host-side pruning of stale nodes.
    pub fn remove(&mut self, path: &GuidPath) -> Option<LeafSaveData> {
        self.leaves.remove(path)
    }

    pub fn get(&self, path: &GuidPath) -> Option<&LeafSaveData> {
        self.leaves.get(path)
    }

    pub fn contains(&self, path: &GuidPath) -> bool {
        self.leaves.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GuidPath, &LeafSaveData)> {
        self.leaves.iter()
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

/// Top-level persisted document: the global branch plus one branch per scope,
/// stamped with the format version of the engine that wrote it.
///
/// Created fresh per save operation; one document per save file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootSaveData {
    pub format_version: SaveVersion,
    global: BranchSaveData,
    scopes: BTreeMap<String, BranchSaveData>,
}

impl RootSaveData {
    pub fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            global: BranchSaveData::new(GLOBAL_SCOPE),
            scopes: BTreeMap::new(),
        }
    }

    /// Branch for a scope name, resolving `"global"` to the global branch.
    pub fn branch(&self, scope: &str) -> Option<&BranchSaveData> {
        if scope == GLOBAL_SCOPE {
            Some(&self.global)
        } else {
            self.scopes.get(scope)
        }
    }

    /// Branch for a scope name, creating an empty scope branch on demand.
    pub fn branch_mut(&mut self, scope: &str) -> &mut BranchSaveData {
        if scope == GLOBAL_SCOPE {
            &mut self.global
        } else {
            self.scopes
                .entry(scope.to_string())
                .or_insert_with(|| BranchSaveData::new(scope))
        }
    }

    pub fn global(&self) -> &BranchSaveData {
        &self.global
    }

    /// Scope branches, global excluded.
    pub fn scopes(&self) -> impl Iterator<Item = (&str, &BranchSaveData)> {
        self.scopes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every branch in the document, global first.
    pub fn branches(&self) -> impl Iterator<Item = &BranchSaveData> {
        std::iter::once(&self.global).chain(self.scopes.values())
    }

    /// Look up one leaf anywhere in the document.
    pub fn find(&self, path: &GuidPath) -> Option<&LeafSaveData> {
        self.branch(path.scope())?.get(path)
    }

    /// Total leaf count across all branches.
    pub fn node_count(&self) -> usize {
        self.branches().map(BranchSaveData::len).sum()
    }
}

impl Default for RootSaveData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_rejects_foreign_scope() {
        let mut branch = BranchSaveData::new("level1");
        let foreign = GuidPath::root("level2", "boss");
        assert!(matches!(
            branch.upsert(foreign, LeafSaveData::new("enemy")),
            Err(DataError::ScopeMismatch { .. })
        ));
    }

    #[test]
    fn branch_upsert_replaces() {
        let mut branch = BranchSaveData::new("level1");
        let path = GuidPath::root("level1", "door");
        branch.upsert(path.clone(), LeafSaveData::new("door")).unwrap();
        let mut newer = LeafSaveData::new("door");
        newer.insert_value("open", serde_json::json!(true)).unwrap();
        branch.upsert(path.clone(), newer.clone()).unwrap();
        assert_eq!(branch.len(), 1);
        assert_eq!(branch.get(&path), Some(&newer));
    }

    #[test]
    fn root_creates_scope_branches_on_demand() {
        let mut root = RootSaveData::new();
        assert!(root.branch("level1").is_none());
        root.branch_mut("level1");
        assert!(root.branch("level1").is_some());
        assert_eq!(root.branch("level1").unwrap().scope(), "level1");
    }

    #[test]
    fn global_scope_name_resolves_to_global_branch() {
        let mut root = RootSaveData::new();
        let path = GuidPath::root(GLOBAL_SCOPE, "settings");
        root.branch_mut(GLOBAL_SCOPE)
            .upsert(path.clone(), LeafSaveData::new("settings"))
            .unwrap();
        assert!(root.global().contains(&path));
        assert!(root.find(&path).is_some());
        // Not duplicated into the named-scope map.
        assert_eq!(root.scopes().count(), 0);
    }

    #[test]
    fn find_searches_all_branches() {
        let mut root = RootSaveData::new();
        let p1 = GuidPath::root("level1", "a");
        let p2 = GuidPath::root("level2", "b");
        root.branch_mut("level1")
            .upsert(p1.clone(), LeafSaveData::new("x"))
            .unwrap();
        root.branch_mut("level2")
            .upsert(p2.clone(), LeafSaveData::new("y"))
            .unwrap();
        assert!(root.find(&p1).is_some());
        assert!(root.find(&p2).is_some());
        assert_eq!(root.node_count(), 2);
    }
}

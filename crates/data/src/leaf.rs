use crate::DataError;
use keepsake_common::GuidPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One node's flattened state: scalar/inline data separated from outgoing
/// edges.
///
/// `values` holds directly serialized data (including whole nested leaves for
/// owned, non-shared sub-objects). `references` holds edges as target
/// [`GuidPath`]s; `None` records a deliberately empty slot so restore can
/// distinguish "saved as empty" from "never saved".
///
/// A leaf is built once during capture of a single node and never mutated
/// afterwards. `node_type` is the converter type tag used to construct the
/// node's shell on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafSaveData {
    node_type: String,
    values: BTreeMap<String, serde_json::Value>,
    references: BTreeMap<String, Option<GuidPath>>,
}

impl LeafSaveData {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            values: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    /// Converter type tag recorded at capture time.
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// Record an inline value. Rejects a key already used by either map.
    pub fn insert_value(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), DataError> {
        let key = key.into();
        if self.values.contains_key(&key) || self.references.contains_key(&key) {
            return Err(DataError::DuplicateKey { key });
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// Record an outgoing reference. Rejects a key already used by either map.
    pub fn insert_reference(
        &mut self,
        key: impl Into<String>,
        target: Option<GuidPath>,
    ) -> Result<(), DataError> {
        let key = key.into();
        if self.values.contains_key(&key) || self.references.contains_key(&key) {
            return Err(DataError::DuplicateKey { key });
        }
        self.references.insert(key, target);
        Ok(())
    }

    pub fn value(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// `None` if the key was never saved; `Some(None)` if it was saved empty.
    pub fn reference(&self, key: &str) -> Option<&Option<GuidPath>> {
        self.references.get(key)
    }

    pub fn value_keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn reference_keys(&self) -> impl Iterator<Item = &str> {
        self.references.keys().map(String::as_str)
    }

    /// All recorded edges, keyed by field slot.
    pub fn references(&self) -> impl Iterator<Item = (&str, Option<&GuidPath>)> {
        self.references
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.references.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_and_reference_keys_are_disjoint() {
        let mut leaf = LeafSaveData::new("player");
        leaf.insert_value("hp", serde_json::json!(100)).unwrap();
        assert!(matches!(
            leaf.insert_reference("hp", None),
            Err(DataError::DuplicateKey { .. })
        ));
        assert!(matches!(
            leaf.insert_value("hp", serde_json::json!(50)),
            Err(DataError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn empty_reference_is_distinguishable_from_absent() {
        let mut leaf = LeafSaveData::new("player");
        leaf.insert_reference("target", None).unwrap();
        assert_eq!(leaf.reference("target"), Some(&None));
        assert_eq!(leaf.reference("missing"), None);
    }

    #[test]
    fn serde_roundtrip_preserves_maps() {
        let mut leaf = LeafSaveData::new("npc");
        leaf.insert_value("name", serde_json::json!("Brann")).unwrap();
        leaf.insert_reference("home", Some(GuidPath::root("hub", "tavern")))
            .unwrap();

        let json = serde_json::to_value(&leaf).unwrap();
        let back: LeafSaveData = serde_json::from_value(json).unwrap();
        assert_eq!(back, leaf);
        assert_eq!(back.node_type(), "npc");
    }
}

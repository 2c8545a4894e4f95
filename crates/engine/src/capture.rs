use crate::error::SaveError;
use crate::node::{NodeHandle, NodeRef};
use crate::registry::{ConverterRegistry, Saveable};
use keepsake_common::GuidPath;
use keepsake_data::{LeafSaveData, RootSaveData};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One declared top-level save group: scope name, stable root id, node.
pub struct SaveRoot {
    pub scope: String,
    pub id: String,
    pub node: NodeHandle,
}

/// Host-side enumeration of the currently active roots. The engine never
/// discovers roots itself.
pub trait RootProvider {
    fn save_roots(&self) -> Vec<SaveRoot>;
}

/// Capture every root from a provider into a fresh document.
pub fn capture_all(
    registry: &Arc<ConverterRegistry>,
    provider: &dyn RootProvider,
) -> Result<RootSaveData, SaveError> {
    let mut session = CaptureSession::new(registry.clone());
    for root in provider.save_roots() {
        session.capture_root(&root.scope, &root.id, &root.node)?;
    }
    Ok(session.finish())
}

/// One snapshot operation: walks live nodes depth-first from the declared
/// roots and flattens them into a [`RootSaveData`].
///
/// The session owns its seen-object table, so concurrent captures of
/// *different* graphs are independent; captures of the same graph must be
/// serialized by the caller.
pub struct CaptureSession {
    registry: Arc<ConverterRegistry>,
    /// Live identity -> assigned path. Checked before recursing, so a cycle
    /// terminates by reusing the in-progress path.
    seen: HashMap<usize, GuidPath>,
    /// Stable externally-assigned addresses for cross-scope singletons.
    external: HashMap<usize, GuidPath>,
    root: RootSaveData,
}

impl CaptureSession {
    pub fn new(registry: Arc<ConverterRegistry>) -> Self {
        Self {
            registry,
            seen: HashMap::new(),
            external: HashMap::new(),
            root: RootSaveData::new(),
        }
    }

    /// Declare a well-known external identity: when this node is reached
    /// through any reference it keeps the given stable path instead of a
    /// freshly minted child path.
    pub fn declare_external(&mut self, handle: &NodeHandle, path: GuidPath) {
        self.external.insert(handle.identity(), path);
    }

    /// Capture one root under `scope:id`. Already-visited roots are skipped.
    pub fn capture_root(
        &mut self,
        scope: &str,
        id: &str,
        handle: &NodeHandle,
    ) -> Result<(), SaveError> {
        if self.seen.contains_key(&handle.identity()) {
            return Ok(());
        }
        self.capture_node(handle, GuidPath::root(scope, id))
    }

    /// Consume the session, yielding the flattened document.
    pub fn finish(self) -> RootSaveData {
        self.root
    }

    fn capture_node(&mut self, handle: &NodeHandle, path: GuidPath) -> Result<(), SaveError> {
        // Insert before recursing: cycle safety depends on this ordering.
        self.seen.insert(handle.identity(), path.clone());
        let conv =
            self.registry
                .resolve(handle.type_id())
                .ok_or_else(|| SaveError::UnsupportedType {
                    type_name: handle.type_name().to_string(),
                    path: path.clone(),
                })?;
        let mut leaf = LeafSaveData::new(conv.type_tag());
        {
            let mut out = SnapshotHandler {
                path: &path,
                leaf: &mut leaf,
                session: self,
            };
            conv.capture(handle, &mut out)?;
        }
        debug!(node = %path, node_type = leaf.node_type(), "captured node");
        self.root.branch_mut(path.scope()).upsert(path, leaf)?;
        Ok(())
    }

    /// Resolve the path for a referenced node, capturing it first if unseen.
    fn reference(
        &mut self,
        handle: NodeHandle,
        parent: &GuidPath,
        key: &str,
    ) -> Result<GuidPath, SaveError> {
        let identity = handle.identity();
        if let Some(existing) = self.seen.get(&identity) {
            return Ok(existing.clone());
        }
        let path = match self.external.get(&identity) {
            Some(stable) => stable.clone(),
            None => parent.child(key),
        };
        self.capture_node(&handle, path.clone())?;
        Ok(path)
    }
}

/// Per-node capture handler, bound to the node's assigned [`GuidPath`].
///
/// `save` inlines data into the leaf's value map; `save_ref` records an edge
/// and walks into the target if it has not been captured yet. A key may be
/// used once per node, in one of the two maps.
pub struct SnapshotHandler<'a> {
    path: &'a GuidPath,
    leaf: &'a mut LeafSaveData,
    session: &'a mut CaptureSession,
}

impl SnapshotHandler<'_> {
    /// Address of the node currently being captured.
    pub fn path(&self) -> &GuidPath {
        self.path
    }

    /// Inline a directly serializable value.
    pub fn save<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), SaveError> {
        let json = serde_json::to_value(value).map_err(|source| SaveError::EncodeValue {
            path: self.path.clone(),
            key: key.to_string(),
            source,
        })?;
        self.leaf.insert_value(key, json)?;
        Ok(())
    }

    /// Capture an owned, non-shared sub-object inline: its leaf is embedded
    /// as a value and it receives no independent address. References inside
    /// the sub-object still mint under `path/key`.
    pub fn save_owned<T: Saveable>(&mut self, key: &str, value: &T) -> Result<(), SaveError> {
        let sub_path = self.path.child(key);
        let mut leaf = LeafSaveData::new(T::TYPE_TAG);
        {
            let mut out = SnapshotHandler {
                path: &sub_path,
                leaf: &mut leaf,
                session: &mut *self.session,
            };
            value.capture(&mut out)?;
        }
        let json = serde_json::to_value(&leaf).map_err(|source| SaveError::EncodeValue {
            path: self.path.clone(),
            key: key.to_string(),
            source,
        })?;
        self.leaf.insert_value(key, json)?;
        Ok(())
    }

    /// Record a reference slot. A target seen before reuses its path
    /// (deduplication); an unseen target is captured depth-first under a
    /// freshly minted child path, unless it was declared external.
    pub fn save_ref<T: 'static>(
        &mut self,
        key: &str,
        target: Option<&NodeRef<T>>,
    ) -> Result<(), SaveError> {
        match target {
            None => {
                self.leaf.insert_reference(key, None)?;
                Ok(())
            }
            Some(rc) => {
                let handle = NodeHandle::new(rc);
                let path = self.session.reference(handle, self.path, key)?;
                self.leaf.insert_reference(key, Some(path))?;
                Ok(())
            }
        }
    }
}

use crate::error::SaveError;
use crate::node::{NodeHandle, NodeRef, WeakHandle, node};
use crate::registry::{Converter, ConverterRegistry, Saveable};
use keepsake_common::GuidPath;
use keepsake_data::{GLOBAL_SCOPE, LeafSaveData, RootSaveData};
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use tracing::warn;

/// Identity-table semantics for a restore run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Every node is freshly constructed; the table starts empty.
    Hard,
    /// Still-live instances from a previous run are patched in place;
    /// dead entries are constructed as in `Hard`.
    Soft,
}

/// Options for one restore run.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub mode: LoadMode,
    /// Named scopes to restore; `None` restores every scope in the document.
    /// The global branch is always restored.
    pub scopes: Option<BTreeSet<String>>,
}

impl RestoreOptions {
    pub fn hard() -> Self {
        Self {
            mode: LoadMode::Hard,
            scopes: None,
        }
    }

    pub fn soft() -> Self {
        Self {
            mode: LoadMode::Soft,
            scopes: None,
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }
}

/// A reference whose target path was absent from the identity table at
/// drain time. The field stays at its shell default.
#[derive(Debug, Clone, PartialEq)]
pub struct DanglingReference {
    pub owner: GuidPath,
    pub key: String,
    pub target: GuidPath,
}

/// Outcome of one restore run. Dangling references and skipped nodes are
/// degradations, not failures.
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Shells constructed this run.
    pub created: usize,
    /// Live instances patched in place (soft mode only).
    pub reused: usize,
    pub dangling: Vec<DanglingReference>,
    /// Nodes skipped because they reference scopes not being restored.
    pub skipped: Vec<GuidPath>,
}

/// One deferred reference assignment, drained FIFO after all shells exist.
struct PatchAction {
    owner: GuidPath,
    key: String,
    target: GuidPath,
    apply: Box<dyn FnOnce(&NodeHandle) -> Result<(), SaveError>>,
}

/// One restore operation (reusable across runs for soft reloads).
///
/// Two-pass design: pass 1 registers a shell for every included leaf in the
/// identity table, pass 2 assigns values immediately and queues reference
/// assignments, then drains the queue against the now-complete table.
/// Setters receive no handler, so they cannot re-enqueue and draining
/// terminates.
pub struct RestoreSession {
    registry: Arc<ConverterRegistry>,
    identity: HashMap<GuidPath, NodeHandle>,
    /// Weak handles from previous runs, seeding soft-mode identity.
    retained: HashMap<GuidPath, WeakHandle>,
    queue: VecDeque<PatchAction>,
}

impl RestoreSession {
    pub fn new(registry: Arc<ConverterRegistry>) -> Self {
        Self {
            registry,
            identity: HashMap::new(),
            retained: HashMap::new(),
            queue: VecDeque::new(),
        }
    }

    /// Seed the soft-reload cache with a live host object, e.g. one created
    /// outside the engine that should be patched rather than duplicated.
    pub fn retain(&mut self, path: GuidPath, handle: &NodeHandle) {
        self.retained.insert(path, handle.downgrade());
    }

    /// Look up an instance restored by the most recent run.
    pub fn resolve<T: 'static>(&self, path: &GuidPath) -> Option<NodeRef<T>> {
        self.identity.get(path).and_then(NodeHandle::downcast)
    }

    pub fn handle(&self, path: &GuidPath) -> Option<&NodeHandle> {
        self.identity.get(path)
    }

    /// Rebuild live instances from a flattened document.
    pub fn restore(
        &mut self,
        data: &RootSaveData,
        options: &RestoreOptions,
    ) -> Result<RestoreReport, SaveError> {
        self.identity.clear();
        self.queue.clear();
        let mut report = RestoreReport::default();

        // The global branch is always in; named scopes are intersected with
        // the active set.
        let restored_scopes: BTreeSet<&str> = std::iter::once(GLOBAL_SCOPE)
            .chain(data.scopes().map(|(name, _)| name).filter(
                |name| match &options.scopes {
                    None => true,
                    Some(active) => active.contains(*name),
                },
            ))
            .collect();

        // Leaves to restore. A node referencing into a scope that is not
        // being restored is skipped whole rather than partially patched.
        let mut included: Vec<(&GuidPath, &LeafSaveData)> = Vec::new();
        for branch in data.branches() {
            if !restored_scopes.contains(branch.scope()) {
                continue;
            }
            for (path, leaf) in branch.iter() {
                let out_of_scope = leaf.references().any(|(_, target)| {
                    target.is_some_and(|t| !restored_scopes.contains(t.scope()))
                });
                if out_of_scope {
                    warn!(node = %path, "skipping node referencing an inactive scope");
                    report.skipped.push(path.clone());
                    continue;
                }
                included.push((path, leaf));
            }
        }

        // Pass 1: a shell per leaf, registered before any field is touched,
        // so self- and sibling-references resolve during the drain.
        let mut plan: Vec<(&GuidPath, &LeafSaveData, Arc<dyn Converter>)> =
            Vec::with_capacity(included.len());
        for (path, leaf) in included {
            let conv = self.registry.resolve_tag(leaf.node_type()).ok_or_else(|| {
                SaveError::UnknownTypeTag {
                    tag: leaf.node_type().to_string(),
                    path: path.clone(),
                }
            })?;
            let live = match options.mode {
                LoadMode::Soft => self
                    .retained
                    .get(path)
                    .and_then(WeakHandle::upgrade)
                    .filter(|h| h.type_id() == conv.target_type()),
                LoadMode::Hard => None,
            };
            let handle = match live {
                Some(existing) => {
                    report.reused += 1;
                    existing
                }
                None => {
                    report.created += 1;
                    conv.create_shell()
                }
            };
            self.identity.insert(path.clone(), handle);
            plan.push((path, leaf, conv));
        }

        // Pass 2: values immediately, reference slots into the queue.
        for (path, leaf, conv) in plan {
            let Some(handle) = self.identity.get(path).cloned() else {
                continue;
            };
            let mut input = RestoreHandler {
                path,
                leaf,
                session: &mut *self,
                report: &mut report,
                immediate: false,
            };
            conv.patch(&handle, &mut input)?;
        }

        // Drain FIFO against the complete identity table.
        while let Some(action) = self.queue.pop_front() {
            let PatchAction {
                owner,
                key,
                target,
                apply,
            } = action;
            match self.identity.get(&target) {
                Some(handle) => apply(handle)?,
                None => {
                    warn!(
                        owner = %owner,
                        key = %key,
                        target = %target,
                        "dangling reference left unset"
                    );
                    report.dangling.push(DanglingReference { owner, key, target });
                }
            }
        }

        // Rebuild the soft-reload cache from this run's identity table so
        // paths absent from the latest document do not accumulate forever.
        self.retained.clear();
        for (path, handle) in &self.identity {
            self.retained.insert(path.clone(), handle.downgrade());
        }
        Ok(report)
    }
}

/// Per-node restore handler, bound to the node's path and leaf.
pub struct RestoreHandler<'a> {
    path: &'a GuidPath,
    leaf: &'a LeafSaveData,
    session: &'a mut RestoreSession,
    report: &'a mut RestoreReport,
    /// Owned sub-objects resolve references in place (the identity table is
    /// already complete in pass 2) because their queue entries could not
    /// outlive the enclosing `load_owned` call.
    immediate: bool,
}

impl RestoreHandler<'_> {
    pub fn path(&self) -> &GuidPath {
        self.path
    }

    /// Read back an inline value. `Ok(None)` if the key was never saved.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SaveError> {
        let Some(value) = self.leaf.value(key) else {
            return Ok(None);
        };
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|source| SaveError::DecodeValue {
                path: self.path.clone(),
                key: key.to_string(),
                source,
            })
    }

    /// Rebuild an owned, inline sub-object from its embedded leaf.
    pub fn load_owned<T: Saveable>(&mut self, key: &str) -> Result<Option<T>, SaveError> {
        let Some(value) = self.leaf.value(key) else {
            return Ok(None);
        };
        let nested: LeafSaveData =
            serde_json::from_value(value.clone()).map_err(|source| SaveError::DecodeValue {
                path: self.path.clone(),
                key: key.to_string(),
                source,
            })?;
        let sub_path = self.path.child(key);
        let shell = node(T::create_shell());
        {
            let mut input = RestoreHandler {
                path: &sub_path,
                leaf: &nested,
                session: &mut *self.session,
                report: &mut *self.report,
                immediate: true,
            };
            T::restore(&shell, &mut input)?;
        }
        match Rc::try_unwrap(shell) {
            Ok(cell) => Ok(Some(cell.into_inner())),
            Err(_) => Err(SaveError::OwnedEscaped {
                path: self.path.clone(),
                key: key.to_string(),
            }),
        }
    }

    /// Keys of every saved reference slot on this node.
    pub fn reference_keys(&self) -> Vec<String> {
        self.leaf.reference_keys().map(str::to_string).collect()
    }

    /// Schedule a reference assignment. A slot saved empty assigns `None`
    /// immediately; a missing key leaves the shell default untouched; a
    /// saved target is resolved from the identity table once all shells
    /// exist. Setters must be idempotent single assignments.
    pub fn defer_ref<T: 'static>(
        &mut self,
        key: &str,
        assign: impl FnOnce(Option<NodeRef<T>>) + 'static,
    ) -> Result<(), SaveError> {
        let Some(slot) = self.leaf.reference(key) else {
            return Ok(());
        };
        let Some(target) = slot.clone() else {
            assign(None);
            return Ok(());
        };
        if self.immediate {
            match self.session.identity.get(&target) {
                Some(handle) => {
                    let rc =
                        handle
                            .downcast::<T>()
                            .ok_or_else(|| SaveError::PatchTypeMismatch {
                                owner: self.path.clone(),
                                key: key.to_string(),
                                target: target.clone(),
                                expected: std::any::type_name::<T>().to_string(),
                            })?;
                    assign(Some(rc));
                }
                None => {
                    warn!(owner = %self.path, key, target = %target, "dangling reference left unset");
                    self.report.dangling.push(DanglingReference {
                        owner: self.path.clone(),
                        key: key.to_string(),
                        target,
                    });
                }
            }
            return Ok(());
        }
        let owner = self.path.clone();
        let key_owned = key.to_string();
        let closure_owner = owner.clone();
        let closure_key = key_owned.clone();
        let closure_target = target.clone();
        self.session.queue.push_back(PatchAction {
            owner,
            key: key_owned,
            target,
            apply: Box::new(move |handle| {
                let rc = handle
                    .downcast::<T>()
                    .ok_or_else(|| SaveError::PatchTypeMismatch {
                        owner: closure_owner,
                        key: closure_key,
                        target: closure_target,
                        expected: std::any::type_name::<T>().to_string(),
                    })?;
                assign(Some(rc));
                Ok(())
            }),
        });
        Ok(())
    }
}

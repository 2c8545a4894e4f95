//! Built-in converters for standard containers.
//!
//! Element types are reified at registration time: each helper takes an
//! element tag and registers a converter for one concrete container type,
//! e.g. `register_vec_of::<u32>("u32")` handles `NodeRef<Vec<u32>>`. A `Vec`
//! doubles as the stack container; LIFO behavior is preserved because the
//! round-trip is order-preserving.

use crate::capture::SnapshotHandler;
use crate::error::SaveError;
use crate::node::{NodeHandle, NodeRef, node};
use crate::registry::{Converter, ConverterRegistry};
use crate::restore::RestoreHandler;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

const ITEMS: &str = "items";
const ENTRIES: &str = "entries";

impl ConverterRegistry {
    /// `Vec<T>` of inline values (list and stack).
    pub fn register_vec_of<T>(&mut self, element_tag: &str)
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        self.register(Arc::new(VecConverter::<T>::new(format!(
            "list<{element_tag}>"
        ))));
    }

    /// `VecDeque<T>` of inline values (queue).
    pub fn register_deque_of<T>(&mut self, element_tag: &str)
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        self.register(Arc::new(DequeConverter::<T>::new(format!(
            "queue<{element_tag}>"
        ))));
    }

    /// `BTreeMap<K, V>` of inline entries.
    pub fn register_map_of<K, V>(&mut self, key_tag: &str, value_tag: &str)
    where
        K: Serialize + DeserializeOwned + Ord + 'static,
        V: Serialize + DeserializeOwned + 'static,
    {
        self.register(Arc::new(MapConverter::<K, V>::new(format!(
            "map<{key_tag},{value_tag}>"
        ))));
    }

    /// `HashMap<K, V>` of inline entries. Key/value fidelity only; iteration
    /// order is not a property of the container.
    pub fn register_hash_map_of<K, V>(&mut self, key_tag: &str, value_tag: &str)
    where
        K: Serialize + DeserializeOwned + Eq + Hash + 'static,
        V: Serialize + DeserializeOwned + 'static,
    {
        self.register(Arc::new(HashMapConverter::<K, V>::new(format!(
            "hashmap<{key_tag},{value_tag}>"
        ))));
    }

    /// Fixed-size `[T; N]` of inline values.
    pub fn register_array_of<T, const N: usize>(&mut self, element_tag: &str)
    where
        T: Serialize + DeserializeOwned + Default + 'static,
    {
        self.register(Arc::new(ArrayConverter::<T, N>::new(format!(
            "array<{element_tag},{N}>"
        ))));
    }

    /// `Vec<NodeRef<T>>`: a list whose elements are shared graph nodes,
    /// saved as one reference slot per index.
    pub fn register_vec_of_nodes<T: 'static>(&mut self, element_tag: &str) {
        self.register(Arc::new(NodeVecConverter::<T>::new(format!(
            "reflist<{element_tag}>"
        ))));
    }
}

macro_rules! downcast_node {
    ($node:expr, $handler:expr, $ty:ty) => {
        $node
            .downcast::<$ty>()
            .ok_or_else(|| SaveError::NodeTypeMismatch {
                path: $handler.path().clone(),
                expected: std::any::type_name::<$ty>().to_string(),
            })?
    };
}

struct VecConverter<T> {
    tag: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> VecConverter<T> {
    fn new(tag: String) -> Self {
        Self {
            tag,
            _marker: PhantomData,
        }
    }
}

impl<T> Converter for VecConverter<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn type_tag(&self) -> &str {
        &self.tag
    }

    fn target_type(&self) -> TypeId {
        TypeId::of::<Vec<T>>()
    }

    fn capture(&self, node: &NodeHandle, out: &mut SnapshotHandler<'_>) -> Result<(), SaveError> {
        let rc = downcast_node!(node, out, Vec<T>);
        let guard = rc.try_borrow().map_err(|_| SaveError::NodeBorrowed {
            path: out.path().clone(),
        })?;
        out.save(ITEMS, &*guard)
    }

    fn create_shell(&self) -> NodeHandle {
        NodeHandle::new(&node(Vec::<T>::new()))
    }

    fn patch(&self, shell: &NodeHandle, input: &mut RestoreHandler<'_>) -> Result<(), SaveError> {
        let rc = downcast_node!(shell, input, Vec<T>);
        if let Some(items) = input.load::<Vec<T>>(ITEMS)? {
            *rc.borrow_mut() = items;
        }
        Ok(())
    }
}

struct DequeConverter<T> {
    tag: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DequeConverter<T> {
    fn new(tag: String) -> Self {
        Self {
            tag,
            _marker: PhantomData,
        }
    }
}

impl<T> Converter for DequeConverter<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn type_tag(&self) -> &str {
        &self.tag
    }

    fn target_type(&self) -> TypeId {
        TypeId::of::<VecDeque<T>>()
    }

    fn capture(&self, node: &NodeHandle, out: &mut SnapshotHandler<'_>) -> Result<(), SaveError> {
        let rc = downcast_node!(node, out, VecDeque<T>);
        let guard = rc.try_borrow().map_err(|_| SaveError::NodeBorrowed {
            path: out.path().clone(),
        })?;
        out.save(ITEMS, &*guard)
    }

    fn create_shell(&self) -> NodeHandle {
        NodeHandle::new(&node(VecDeque::<T>::new()))
    }

    fn patch(&self, shell: &NodeHandle, input: &mut RestoreHandler<'_>) -> Result<(), SaveError> {
        let rc = downcast_node!(shell, input, VecDeque<T>);
        if let Some(items) = input.load::<VecDeque<T>>(ITEMS)? {
            *rc.borrow_mut() = items;
        }
        Ok(())
    }
}

struct MapConverter<K, V> {
    tag: String,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> MapConverter<K, V> {
    fn new(tag: String) -> Self {
        Self {
            tag,
            _marker: PhantomData,
        }
    }
}

impl<K, V> Converter for MapConverter<K, V>
where
    K: Serialize + DeserializeOwned + Ord + 'static,
    V: Serialize + DeserializeOwned + 'static,
{
    fn type_tag(&self) -> &str {
        &self.tag
    }

    fn target_type(&self) -> TypeId {
        TypeId::of::<BTreeMap<K, V>>()
    }

    fn capture(&self, node: &NodeHandle, out: &mut SnapshotHandler<'_>) -> Result<(), SaveError> {
        let rc = downcast_node!(node, out, BTreeMap<K, V>);
        let guard = rc.try_borrow().map_err(|_| SaveError::NodeBorrowed {
            path: out.path().clone(),
        })?;
        // Entry pairs, not a JSON object: keys are not restricted to strings.
        let entries: Vec<(&K, &V)> = guard.iter().collect();
        out.save(ENTRIES, &entries)
    }

    fn create_shell(&self) -> NodeHandle {
        NodeHandle::new(&node(BTreeMap::<K, V>::new()))
    }

    fn patch(&self, shell: &NodeHandle, input: &mut RestoreHandler<'_>) -> Result<(), SaveError> {
        let rc = downcast_node!(shell, input, BTreeMap<K, V>);
        if let Some(entries) = input.load::<Vec<(K, V)>>(ENTRIES)? {
            *rc.borrow_mut() = entries.into_iter().collect();
        }
        Ok(())
    }
}

struct HashMapConverter<K, V> {
    tag: String,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> HashMapConverter<K, V> {
    fn new(tag: String) -> Self {
        Self {
            tag,
            _marker: PhantomData,
        }
    }
}

impl<K, V> Converter for HashMapConverter<K, V>
where
    K: Serialize + DeserializeOwned + Eq + Hash + 'static,
    V: Serialize + DeserializeOwned + 'static,
{
    fn type_tag(&self) -> &str {
        &self.tag
    }

    fn target_type(&self) -> TypeId {
        TypeId::of::<HashMap<K, V>>()
    }

    fn capture(&self, node: &NodeHandle, out: &mut SnapshotHandler<'_>) -> Result<(), SaveError> {
        let rc = downcast_node!(node, out, HashMap<K, V>);
        let guard = rc.try_borrow().map_err(|_| SaveError::NodeBorrowed {
            path: out.path().clone(),
        })?;
        let entries: Vec<(&K, &V)> = guard.iter().collect();
        out.save(ENTRIES, &entries)
    }

    fn create_shell(&self) -> NodeHandle {
        NodeHandle::new(&node(HashMap::<K, V>::new()))
    }

    fn patch(&self, shell: &NodeHandle, input: &mut RestoreHandler<'_>) -> Result<(), SaveError> {
        let rc = downcast_node!(shell, input, HashMap<K, V>);
        if let Some(entries) = input.load::<Vec<(K, V)>>(ENTRIES)? {
            *rc.borrow_mut() = entries.into_iter().collect();
        }
        Ok(())
    }
}

struct ArrayConverter<T, const N: usize> {
    tag: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T, const N: usize> ArrayConverter<T, N> {
    fn new(tag: String) -> Self {
        Self {
            tag,
            _marker: PhantomData,
        }
    }
}

impl<T, const N: usize> Converter for ArrayConverter<T, N>
where
    T: Serialize + DeserializeOwned + Default + 'static,
{
    fn type_tag(&self) -> &str {
        &self.tag
    }

    fn target_type(&self) -> TypeId {
        TypeId::of::<[T; N]>()
    }

    fn capture(&self, node: &NodeHandle, out: &mut SnapshotHandler<'_>) -> Result<(), SaveError> {
        let rc = downcast_node!(node, out, [T; N]);
        let guard = rc.try_borrow().map_err(|_| SaveError::NodeBorrowed {
            path: out.path().clone(),
        })?;
        out.save(ITEMS, &guard[..])
    }

    fn create_shell(&self) -> NodeHandle {
        NodeHandle::new(&node(std::array::from_fn::<T, N, _>(|_| T::default())))
    }

    fn patch(&self, shell: &NodeHandle, input: &mut RestoreHandler<'_>) -> Result<(), SaveError> {
        let rc = downcast_node!(shell, input, [T; N]);
        if let Some(items) = input.load::<Vec<T>>(ITEMS)? {
            let found = items.len();
            let array: [T; N] = items.try_into().map_err(|_| SaveError::ArrayLength {
                path: input.path().clone(),
                key: ITEMS.to_string(),
                expected: N,
                found,
            })?;
            *rc.borrow_mut() = array;
        }
        Ok(())
    }
}

/// List of shared nodes: each element is its own reference slot, keyed by
/// index. A dangling element is dropped from the rebuilt list; surviving
/// elements keep their relative order (the queue drains FIFO).
struct NodeVecConverter<T> {
    tag: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> NodeVecConverter<T> {
    fn new(tag: String) -> Self {
        Self {
            tag,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Converter for NodeVecConverter<T> {
    fn type_tag(&self) -> &str {
        &self.tag
    }

    fn target_type(&self) -> TypeId {
        TypeId::of::<Vec<NodeRef<T>>>()
    }

    fn capture(&self, node: &NodeHandle, out: &mut SnapshotHandler<'_>) -> Result<(), SaveError> {
        let rc = downcast_node!(node, out, Vec<NodeRef<T>>);
        let guard = rc.try_borrow().map_err(|_| SaveError::NodeBorrowed {
            path: out.path().clone(),
        })?;
        for (index, item) in guard.iter().enumerate() {
            out.save_ref(&index.to_string(), Some(item))?;
        }
        Ok(())
    }

    fn create_shell(&self) -> NodeHandle {
        NodeHandle::new(&node(Vec::<NodeRef<T>>::new()))
    }

    fn patch(&self, shell: &NodeHandle, input: &mut RestoreHandler<'_>) -> Result<(), SaveError> {
        let rc = downcast_node!(shell, input, Vec<NodeRef<T>>);
        rc.borrow_mut().clear();
        let mut indices: Vec<usize> = input
            .reference_keys()
            .iter()
            .filter_map(|key| key.parse().ok())
            .collect();
        indices.sort_unstable();
        for index in indices {
            let me = rc.clone();
            input.defer_ref::<T>(&index.to_string(), move |target| {
                if let Some(item) = target {
                    me.borrow_mut().push(item);
                }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureSession;
    use crate::restore::{RestoreOptions, RestoreSession};
    use keepsake_common::GuidPath;
    use keepsake_data::RootSaveData;
    use std::rc::Rc;

    fn roundtrip<T: 'static>(
        registry: &Arc<ConverterRegistry>,
        value: NodeRef<T>,
    ) -> (RootSaveData, NodeRef<T>) {
        let mut capture = CaptureSession::new(registry.clone());
        capture
            .capture_root("level", "it", &NodeHandle::new(&value))
            .unwrap();
        let data = capture.finish();

        let mut restore = RestoreSession::new(registry.clone());
        let report = restore.restore(&data, &RestoreOptions::hard()).unwrap();
        assert!(report.dangling.is_empty());
        let back = restore.resolve::<T>(&GuidPath::root("level", "it")).unwrap();
        (data, back)
    }

    #[test]
    fn vec_roundtrip_preserves_order() {
        let mut registry = ConverterRegistry::new();
        registry.register_vec_of::<String>("string");
        let registry = Arc::new(registry);

        let (_, back) = roundtrip(&registry, node(vec![
            "first".to_string(),
            "second".to_string(),
            "third".to_string(),
        ]));
        assert_eq!(*back.borrow(), vec!["first", "second", "third"]);

        let (_, empty) = roundtrip(&registry, node(Vec::<String>::new()));
        assert!(empty.borrow().is_empty());
    }

    #[test]
    fn vec_as_stack_preserves_lifo_order() {
        let mut registry = ConverterRegistry::new();
        registry.register_vec_of::<i32>("i32");
        let registry = Arc::new(registry);

        let mut stack = Vec::new();
        stack.push(1);
        stack.push(2);
        stack.push(3);
        let (_, back) = roundtrip(&registry, node(stack));
        assert_eq!(back.borrow_mut().pop(), Some(3));
        assert_eq!(back.borrow_mut().pop(), Some(2));
        assert_eq!(back.borrow_mut().pop(), Some(1));
    }

    #[test]
    fn deque_roundtrip_preserves_order() {
        let mut registry = ConverterRegistry::new();
        registry.register_deque_of::<u8>("u8");
        let registry = Arc::new(registry);

        let queue: VecDeque<u8> = [10, 20, 30].into_iter().collect();
        let (_, back) = roundtrip(&registry, node(queue));
        assert_eq!(back.borrow_mut().pop_front(), Some(10));
        assert_eq!(back.borrow_mut().pop_front(), Some(20));
        assert_eq!(back.borrow_mut().pop_front(), Some(30));

        let (_, empty) = roundtrip(&registry, node(VecDeque::<u8>::new()));
        assert!(empty.borrow().is_empty());
    }

    #[test]
    fn maps_roundtrip_with_key_value_fidelity() {
        let mut registry = ConverterRegistry::new();
        registry.register_map_of::<u32, String>("u32", "string");
        registry.register_hash_map_of::<String, i64>("string", "i64");
        let registry = Arc::new(registry);

        let mut sorted = BTreeMap::new();
        sorted.insert(3_u32, "c".to_string());
        sorted.insert(1_u32, "a".to_string());
        sorted.insert(2_u32, "b".to_string());
        let (_, back) = roundtrip(&registry, node(sorted.clone()));
        assert_eq!(*back.borrow(), sorted);

        let mut hashed = HashMap::new();
        hashed.insert("x".to_string(), -1_i64);
        hashed.insert("y".to_string(), 7_i64);
        hashed.insert("z".to_string(), 0_i64);
        let (_, back) = roundtrip(&registry, node(hashed.clone()));
        assert_eq!(*back.borrow(), hashed);

        let (_, empty) = roundtrip(&registry, node(BTreeMap::<u32, String>::new()));
        assert!(empty.borrow().is_empty());
    }

    #[test]
    fn array_roundtrip_and_length_check() {
        let mut registry = ConverterRegistry::new();
        registry.register_array_of::<f32, 3>("f32");
        let registry = Arc::new(registry);

        let (data, back) = roundtrip(&registry, node([0.5_f32, 1.5, 2.5]));
        assert_eq!(*back.borrow(), [0.5, 1.5, 2.5]);

        // A payload claiming the wrong length must not half-populate.
        let mut registry2 = ConverterRegistry::new();
        registry2.register_array_of::<f32, 4>("f32");
        // Re-tag the captured leaf so the 4-element converter picks it up.
        let path = GuidPath::root("level", "it");
        let leaf = data.find(&path).unwrap().clone();
        let mut forged = RootSaveData::new();
        let mut retagged = keepsake_data::LeafSaveData::new("array<f32,4>");
        retagged
            .insert_value(ITEMS, leaf.value(ITEMS).unwrap().clone())
            .unwrap();
        forged.branch_mut("level").upsert(path, retagged).unwrap();

        let mut restore = RestoreSession::new(Arc::new(registry2));
        let err = restore
            .restore(&forged, &RestoreOptions::hard())
            .unwrap_err();
        assert!(matches!(err, SaveError::ArrayLength { expected: 4, found: 3, .. }));
    }

    #[test]
    fn node_vec_keeps_shared_identity_and_order() {
        #[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Tag(String);

        let mut registry = ConverterRegistry::new();
        registry.register_value::<Tag>("tag");
        registry.register_vec_of_nodes::<Tag>("tag");
        let registry = Arc::new(registry);

        let shared = node(Tag("shared".into()));
        let list = node(vec![
            node(Tag("solo".into())),
            shared.clone(),
            shared.clone(),
        ]);

        let (_, back) = roundtrip(&registry, list);
        let items = back.borrow();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].borrow().0, "solo");
        assert_eq!(items[1].borrow().0, "shared");
        // Both slots resolve to the same instance, not copies.
        assert!(Rc::ptr_eq(&items[1], &items[2]));

        let (_, empty) = roundtrip(&registry, node(Vec::<NodeRef<Tag>>::new()));
        assert!(empty.borrow().is_empty());
    }
}

use crate::capture::SnapshotHandler;
use crate::error::SaveError;
use crate::node::{NodeHandle, NodeRef, node};
use crate::restore::RestoreHandler;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

/// The state-handler capability: a type that captures and restores its own
/// fields through the engine's handlers.
///
/// `restore` receives the shell's `NodeRef` rather than `&mut self` so that
/// deferred reference setters can capture a clone of the node and run after
/// the whole identity table is populated.
pub trait Saveable: 'static {
    /// Stable tag written into every leaf of this type. Shell construction
    /// on restore resolves this tag back to the registered converter.
    const TYPE_TAG: &'static str;

    fn capture(&self, out: &mut SnapshotHandler<'_>) -> Result<(), SaveError>;

    /// Construct the pass-1 shell: enough of an instance to hold an address.
    fn create_shell() -> Self
    where
        Self: Sized;

    fn restore(this: &NodeRef<Self>, input: &mut RestoreHandler<'_>) -> Result<(), SaveError>
    where
        Self: Sized;
}

/// A capture/restore strategy for one concrete node type.
///
/// Object-safe so the registry can hold them uniformly; the typed end of
/// each implementation lives behind [`NodeHandle::downcast`].
pub trait Converter {
    /// Stable tag identifying this strategy in persisted leaves.
    fn type_tag(&self) -> &str;

    /// `TypeId` of the node value type this converter handles.
    fn target_type(&self) -> TypeId;

    /// Flatten a live node into the handler's leaf.
    fn capture(&self, node: &NodeHandle, out: &mut SnapshotHandler<'_>) -> Result<(), SaveError>;

    /// Construct an empty shell instance for restore pass 1.
    fn create_shell(&self) -> NodeHandle;

    /// Populate a shell's fields from its leaf (restore pass 2). Reference
    /// slots are enqueued through the handler, not resolved here.
    fn patch(&self, shell: &NodeHandle, input: &mut RestoreHandler<'_>) -> Result<(), SaveError>;
}

type ConverterMatcher = Box<dyn Fn(TypeId) -> bool>;
type ConverterFactory = Box<dyn Fn() -> Arc<dyn Converter>>;

struct CustomRegistration {
    matches: ConverterMatcher,
    make: ConverterFactory,
}

/// Type-to-strategy lookup for the capture and restore engines.
///
/// Resolution order: exact registered type, then user-registered custom
/// matchers in registration order. Container converters land in the exact
/// table because element types are reified at registration time. Results,
/// including misses, are memoized.
///
/// Build the registry up front, then share it between sessions via `Arc`.
#[derive(Default)]
pub struct ConverterRegistry {
    by_type: HashMap<TypeId, Arc<dyn Converter>>,
    by_tag: HashMap<String, Arc<dyn Converter>>,
    custom: Vec<CustomRegistration>,
    type_cache: RwLock<HashMap<TypeId, Option<Arc<dyn Converter>>>>,
    tag_cache: RwLock<HashMap<String, Option<Arc<dyn Converter>>>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-built converter. Later registrations for the same
    /// type or tag replace earlier ones.
    pub fn register(&mut self, converter: Arc<dyn Converter>) {
        self.by_tag
            .insert(converter.type_tag().to_string(), converter.clone());
        self.by_type.insert(converter.target_type(), converter);
    }

    /// Register a [`Saveable`] state-handler type.
    pub fn register_handler<T: Saveable>(&mut self) {
        self.register(Arc::new(HandlerConverter::<T>::new()));
    }

    /// Register a plain-serde type as a referencable node: the whole value
    /// is serialized into one slot, the shell is `T::default()`.
    pub fn register_value<T>(&mut self, tag: &str)
    where
        T: Serialize + DeserializeOwned + Default + 'static,
    {
        self.register(Arc::new(ValueConverter::<T>::new(tag)));
    }

    /// Register a user strategy resolved by matcher. The factory runs on
    /// first demand; the instance is then cached.
    pub fn register_custom(
        &mut self,
        matches: impl Fn(TypeId) -> bool + 'static,
        make: impl Fn() -> Arc<dyn Converter> + 'static,
    ) {
        self.custom.push(CustomRegistration {
            matches: Box::new(matches),
            make: Box::new(make),
        });
    }

    /// Resolve the strategy for a concrete type, memoized per type.
    pub fn resolve(&self, type_id: TypeId) -> Option<Arc<dyn Converter>> {
        if let Some(conv) = self.by_type.get(&type_id) {
            return Some(conv.clone());
        }
        {
            let cache = self.type_cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = cache.get(&type_id) {
                return hit.clone();
            }
        }
        let found = self
            .custom
            .iter()
            .find(|c| (c.matches)(type_id))
            .map(|c| (c.make)());
        let mut cache = self.type_cache.write().unwrap_or_else(|e| e.into_inner());
        if let Some(conv) = &found {
            let mut tags = self.tag_cache.write().unwrap_or_else(|e| e.into_inner());
            tags.insert(conv.type_tag().to_string(), Some(conv.clone()));
        }
        cache.insert(type_id, found.clone());
        found
    }

    /// Resolve a strategy by persisted type tag (restore side).
    pub fn resolve_tag(&self, tag: &str) -> Option<Arc<dyn Converter>> {
        if let Some(conv) = self.by_tag.get(tag) {
            return Some(conv.clone());
        }
        {
            let cache = self.tag_cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = cache.get(tag) {
                return hit.clone();
            }
        }
        // Custom factories are instantiated on demand until one claims the tag.
        let mut found = None;
        for custom in &self.custom {
            let conv = (custom.make)();
            if conv.type_tag() == tag {
                found = Some(conv);
                break;
            }
        }
        let mut cache = self.tag_cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(tag.to_string(), found.clone());
        found
    }
}

/// Converter backing every [`Saveable`] registration.
struct HandlerConverter<T: Saveable> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Saveable> HandlerConverter<T> {
    fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: Saveable> Converter for HandlerConverter<T> {
    fn type_tag(&self) -> &str {
        T::TYPE_TAG
    }

    fn target_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn capture(&self, node: &NodeHandle, out: &mut SnapshotHandler<'_>) -> Result<(), SaveError> {
        let rc = node
            .downcast::<T>()
            .ok_or_else(|| SaveError::NodeTypeMismatch {
                path: out.path().clone(),
                expected: std::any::type_name::<T>().to_string(),
            })?;
        let guard = rc.try_borrow().map_err(|_| SaveError::NodeBorrowed {
            path: out.path().clone(),
        })?;
        guard.capture(out)
    }

    fn create_shell(&self) -> NodeHandle {
        let shell = node(T::create_shell());
        NodeHandle::new(&shell)
    }

    fn patch(&self, shell: &NodeHandle, input: &mut RestoreHandler<'_>) -> Result<(), SaveError> {
        let rc = shell
            .downcast::<T>()
            .ok_or_else(|| SaveError::NodeTypeMismatch {
                path: input.path().clone(),
                expected: std::any::type_name::<T>().to_string(),
            })?;
        T::restore(&rc, input)
    }
}

/// Fallback strategy for plain-serde types promoted to referencable nodes:
/// the entire value round-trips through a single `state` slot.
struct ValueConverter<T> {
    tag: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ValueConverter<T> {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            _marker: PhantomData,
        }
    }
}

const VALUE_SLOT: &str = "state";

impl<T> Converter for ValueConverter<T>
where
    T: Serialize + DeserializeOwned + Default + 'static,
{
    fn type_tag(&self) -> &str {
        &self.tag
    }

    fn target_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn capture(&self, node: &NodeHandle, out: &mut SnapshotHandler<'_>) -> Result<(), SaveError> {
        let rc = node
            .downcast::<T>()
            .ok_or_else(|| SaveError::NodeTypeMismatch {
                path: out.path().clone(),
                expected: std::any::type_name::<T>().to_string(),
            })?;
        let guard = rc.try_borrow().map_err(|_| SaveError::NodeBorrowed {
            path: out.path().clone(),
        })?;
        out.save(VALUE_SLOT, &*guard)
    }

    fn create_shell(&self) -> NodeHandle {
        let shell = node(T::default());
        NodeHandle::new(&shell)
    }

    fn patch(&self, shell: &NodeHandle, input: &mut RestoreHandler<'_>) -> Result<(), SaveError> {
        let rc = shell
            .downcast::<T>()
            .ok_or_else(|| SaveError::NodeTypeMismatch {
                path: input.path().clone(),
                expected: std::any::type_name::<T>().to_string(),
            })?;
        if let Some(value) = input.load::<T>(VALUE_SLOT)? {
            *rc.borrow_mut() = value;
        }
        Ok(())
    }
}

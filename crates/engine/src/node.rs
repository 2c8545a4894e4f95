use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Shared, mutable handle to a live graph node.
///
/// Identity is the allocation: two `NodeRef`s compare as the same node iff
/// they point at the same `Rc` allocation. The engine walks graphs of these.
pub type NodeRef<T> = Rc<RefCell<T>>;

/// Wrap a value as a shared graph node.
pub fn node<T>(value: T) -> NodeRef<T> {
    Rc::new(RefCell::new(value))
}

/// Type-erased strong handle to a node, as tracked by the engine's
/// seen-object and identity tables.
///
/// Internally an `Rc<dyn Any>` whose concrete type is always `RefCell<T>`,
/// so [`NodeHandle::downcast`] can recover the typed `NodeRef`.
#[derive(Clone)]
pub struct NodeHandle {
    any: Rc<dyn Any>,
    type_id: TypeId,
    type_name: &'static str,
}

impl NodeHandle {
    pub fn new<T: 'static>(node: &NodeRef<T>) -> Self {
        Self {
            any: node.clone() as Rc<dyn Any>,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// `TypeId` of the wrapped value type `T` (not of `RefCell<T>`).
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Stable identity for the node's lifetime: the allocation address.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.any) as *const () as usize
    }

    /// Recover the typed node, if `T` matches the wrapped type.
    pub fn downcast<T: 'static>(&self) -> Option<NodeRef<T>> {
        self.any.clone().downcast::<RefCell<T>>().ok()
    }

    /// Weak counterpart for the soft-reload identity cache.
    pub fn downgrade(&self) -> WeakHandle {
        WeakHandle {
            any: Rc::downgrade(&self.any),
            type_id: self.type_id,
            type_name: self.type_name,
        }
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("type", &self.type_name)
            .field("identity", &self.identity())
            .finish()
    }
}

/// Weak handle kept between restore runs so a soft reload can patch a
/// still-live instance in place instead of duplicating it.
#[derive(Clone)]
pub struct WeakHandle {
    any: Weak<dyn Any>,
    type_id: TypeId,
    type_name: &'static str,
}

impl WeakHandle {
    /// Upgrade back to a strong handle if the instance is still alive.
    pub fn upgrade(&self) -> Option<NodeHandle> {
        self.any.upgrade().map(|any| NodeHandle {
            any,
            type_id: self.type_id,
            type_name: self.type_name,
        })
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}

impl std::fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakHandle")
            .field("type", &self.type_name)
            .field("alive", &(self.any.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_shared_across_clones() {
        let a = node(5_u32);
        let h1 = NodeHandle::new(&a);
        let h2 = NodeHandle::new(&a.clone());
        assert_eq!(h1.identity(), h2.identity());

        let b = node(5_u32);
        assert_ne!(h1.identity(), NodeHandle::new(&b).identity());
    }

    #[test]
    fn downcast_recovers_the_same_allocation() {
        let a = node(String::from("hello"));
        let handle = NodeHandle::new(&a);
        let back: NodeRef<String> = handle.downcast().unwrap();
        assert!(Rc::ptr_eq(&a, &back));
        assert!(handle.downcast::<u32>().is_none());
    }

    #[test]
    fn weak_handle_dies_with_the_node() {
        let a = node(1_i64);
        let weak = NodeHandle::new(&a).downgrade();
        assert!(weak.upgrade().is_some());
        drop(a);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn type_id_reports_inner_type() {
        let a = node(3.5_f64);
        let handle = NodeHandle::new(&a);
        assert_eq!(handle.type_id(), TypeId::of::<f64>());
    }
}

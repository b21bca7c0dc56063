//! Class-based objects and shared (identity-carrying) objects.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::value::Value;

/// An instance of a registered class, exposing its storable properties by
/// index.
///
/// Implementations are hand-written alongside the class registration; the
/// property indices match the order of the storable-property list in the
/// class descriptor.
pub trait DynamicObject: fmt::Debug + Send + Sync {
    /// The registered class name.
    fn class_name(&self) -> &str;

    /// Number of storable properties.
    fn property_count(&self) -> usize;

    /// Reads a property by index. Out-of-range indices yield
    /// [`Value::Invalid`].
    fn property(&self, index: usize) -> Value;

    /// Writes a property by index. Out-of-range indices and unconvertible
    /// values are ignored.
    fn set_property(&mut self, index: usize, value: Value);

    /// Clones the object behind the trait.
    fn clone_object(&self) -> Box<dyn DynamicObject>;
}

impl Clone for Box<dyn DynamicObject> {
    fn clone(&self) -> Self {
        self.clone_object()
    }
}

impl PartialEq for dyn DynamicObject {
    fn eq(&self, other: &Self) -> bool {
        object_eq(self, other)
    }
}

/// Structural equality: same class, same properties.
pub fn object_eq(a: &dyn DynamicObject, b: &dyn DynamicObject) -> bool {
    a.class_name() == b.class_name()
        && a.property_count() == b.property_count()
        && (0..a.property_count()).all(|i| a.property(i) == b.property(i))
}

static NEXT_LOCAL_ID: AtomicU32 = AtomicU32::new(1);

fn next_local_id() -> u32 {
    NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed)
}

/// A shared object: mutable object state plus the identity needed to track
/// it across messages.
///
/// The *local ID* is unique within this process. The *origin ID* names the
/// lineage: a successor created to replace an object keeps the origin ID but
/// gets a fresh local ID, and the codec deltas each transmission against the
/// most recent object of the same origin. The remote IDs are assigned by the
/// peer when the object arrives over the wire.
pub struct SharedObject {
    local_id: u32,
    origin_id: u32,
    remote_id: AtomicU32,
    remote_origin_id: AtomicU32,
    state: Mutex<Box<dyn DynamicObject>>,
}

/// A strong reference to a [`SharedObject`]. Dropping every strong reference
/// destroys the object; the codec notices lazily through its weak entries.
pub type SharedHandle = Arc<SharedObject>;

impl SharedObject {
    /// Wraps an object as a new shared root: fresh local ID, origin ID equal
    /// to the local ID.
    #[must_use]
    pub fn new(object: Box<dyn DynamicObject>) -> SharedHandle {
        let id = next_local_id();
        Arc::new(Self {
            local_id: id,
            origin_id: id,
            remote_id: AtomicU32::new(0),
            remote_origin_id: AtomicU32::new(0),
            state: Mutex::new(object),
        })
    }

    /// Wraps an object as the successor of `reference`: fresh local ID, same
    /// origin ID, so it becomes the new head of the lineage.
    #[must_use]
    pub fn successor(reference: &SharedHandle, object: Box<dyn DynamicObject>) -> SharedHandle {
        Arc::new(Self {
            local_id: next_local_id(),
            origin_id: reference.origin_id,
            remote_id: AtomicU32::new(0),
            remote_origin_id: AtomicU32::new(0),
            state: Mutex::new(object),
        })
    }

    /// The process-unique ID of this instance.
    #[must_use]
    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// The lineage root ID, stable across replacement by successors.
    #[must_use]
    pub fn origin_id(&self) -> u32 {
        self.origin_id
    }

    /// The peer-assigned ID, or 0 if this object did not arrive over the
    /// wire.
    #[must_use]
    pub fn remote_id(&self) -> u32 {
        self.remote_id.load(Ordering::Relaxed)
    }

    /// The peer-assigned origin ID, or 0.
    #[must_use]
    pub fn remote_origin_id(&self) -> u32 {
        self.remote_origin_id.load(Ordering::Relaxed)
    }

    /// Records the peer-assigned IDs after a decode.
    pub fn set_remote_ids(&self, remote_id: u32, remote_origin_id: u32) {
        self.remote_id.store(remote_id, Ordering::Relaxed);
        self.remote_origin_id
            .store(remote_origin_id, Ordering::Relaxed);
    }

    /// Locks the object state.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn DynamicObject>> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Clones the current object state out of the lock.
    #[must_use]
    pub fn snapshot_state(&self) -> Box<dyn DynamicObject> {
        self.lock().clone_object()
    }
}

impl PartialEq for SharedObject {
    fn eq(&self, other: &Self) -> bool {
        self.local_id == other.local_id
    }
}

impl Eq for SharedObject {}

impl std::hash::Hash for SharedObject {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.local_id.hash(state);
    }
}

impl fmt::Debug for SharedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedObject")
            .field("local_id", &self.local_id)
            .field("origin_id", &self.origin_id)
            .field("remote_id", &self.remote_id())
            .field("remote_origin_id", &self.remote_origin_id())
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Probe;
    use super::*;

    fn probe(label: &str, level: i32) -> Box<dyn DynamicObject> {
        Box::new(Probe {
            label: label.into(),
            level,
        })
    }

    #[test]
    fn object_equality_is_structural() {
        let a = probe("north", 3);
        let b = probe("north", 3);
        let c = probe("north", 4);
        assert!(object_eq(&*a, &*b));
        assert!(!object_eq(&*a, &*c));
    }

    #[test]
    fn boxed_clone_preserves_state() {
        let a = probe("east", 1);
        let b = a.clone();
        assert!(object_eq(&*a, &*b));
    }

    #[test]
    fn new_assigns_unique_ids_with_origin_equal_to_local() {
        let a = SharedObject::new(probe("a", 0));
        let b = SharedObject::new(probe("b", 0));
        assert_ne!(a.local_id(), b.local_id());
        assert_eq!(a.local_id(), a.origin_id());
        assert_eq!(b.local_id(), b.origin_id());
    }

    #[test]
    fn successor_keeps_origin_with_fresh_local_id() {
        let root = SharedObject::new(probe("root", 0));
        let next = SharedObject::successor(&root, probe("root", 1));
        assert_ne!(next.local_id(), root.local_id());
        assert_eq!(next.origin_id(), root.origin_id());
    }

    #[test]
    fn remote_ids_start_zero_and_are_settable() {
        let object = SharedObject::new(probe("x", 0));
        assert_eq!(object.remote_id(), 0);
        assert_eq!(object.remote_origin_id(), 0);
        object.set_remote_ids(9, 4);
        assert_eq!(object.remote_id(), 9);
        assert_eq!(object.remote_origin_id(), 4);
    }

    #[test]
    fn state_updates_through_lock() {
        let object = SharedObject::new(probe("x", 0));
        object.lock().set_property(1, Value::Int(7));
        assert_eq!(object.lock().property(1), Value::Int(7));
    }
}

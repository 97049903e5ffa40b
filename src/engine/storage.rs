//! Component storage contract and the sparse storage.
//!
//! Every component type nominates a concrete storage at definition time.
//! Storages expose two faces: the typed [`ComponentStorage`] contract used by
//! system handles, and the object-safe [`ErasedStorage`] used by the world to
//! route structural changes (destruction detaches, creation-drain inserts)
//! without knowing component types.

use std::any::Any;
use std::cell::UnsafeCell;

use crate::engine::entity_map::EntityMap;
use crate::engine::types::EntityId;

/// Typed contract every concrete component storage satisfies.
///
/// `get`/`get_mut` and `detach` are fatal on an absent entity; `attach` is
/// fatal on a present one. Iteration order is unspecified; callers iterate
/// the followed set and look entities up.
pub trait ComponentStorage<C>: Default + Send + Sync + 'static {
    /// Returns `true` if `id` has a value.
    fn has(&self, id: EntityId) -> bool;

    /// Returns the value for `id`. Fatal if absent.
    fn get(&self, id: EntityId) -> &C;

    /// Returns the value for `id` mutably. Fatal if absent.
    fn get_mut(&mut self, id: EntityId) -> &mut C;

    /// Returns the value for `id`, if present.
    fn get_if(&self, id: EntityId) -> Option<&C>;

    /// Returns the value for `id` mutably, if present.
    fn get_if_mut(&mut self, id: EntityId) -> Option<&mut C>;

    /// Stores `value` for `id`. Fatal if `id` already has a value.
    fn attach(&mut self, id: EntityId, value: C) -> &mut C;

    /// Destroys the value for `id`. Fatal if absent.
    fn detach(&mut self, id: EntityId);

    /// Number of stored values.
    fn len(&self) -> usize;

    /// Returns `true` if no value is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Object-safe face of a component storage.
///
/// The world holds every storage as `Box<dyn ErasedStorage>` and downcasts
/// through [`as_any`](ErasedStorage::as_any) when a typed handle is built.
pub trait ErasedStorage: Send + Sync + 'static {
    /// Returns `true` if `id` has a value.
    fn has(&self, id: EntityId) -> bool;

    /// Destroys the value for `id`. Fatal if absent.
    fn detach(&mut self, id: EntityId);

    /// Downcasts `value` to the component type and attaches it.
    ///
    /// Fatal on a type mismatch or if `id` already has a value.
    fn attach_boxed(&mut self, id: EntityId, value: Box<dyn Any + Send>);

    /// Name of the stored component type, for diagnostics.
    fn component_name(&self) -> &'static str;

    /// Upcast for typed downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared cell holding one component storage.
///
/// During system execution the world is borrowed shared across threads;
/// handles reach mutable storage through this cell. Exclusivity is enforced
/// by the per-component borrow flags plus the parallel-group access check,
/// which is what makes the `Sync` claim sound.
pub(crate) struct StorageCell {
    inner: UnsafeCell<Box<dyn ErasedStorage>>,
}

unsafe impl Sync for StorageCell {}

impl StorageCell {
    pub(crate) fn new(storage: Box<dyn ErasedStorage>) -> Self {
        Self {
            inner: UnsafeCell::new(storage),
        }
    }

    /// Direct access with exclusive access to the world (drains, defrag).
    pub(crate) fn get_mut(&mut self) -> &mut dyn ErasedStorage {
        &mut **self.inner.get_mut()
    }

    /// # Safety
    /// Caller must hold a read borrow on this component, or otherwise
    /// guarantee no concurrent mutable access.
    pub(crate) unsafe fn shared(&self) -> &dyn ErasedStorage {
        unsafe { &**self.inner.get() }
    }

    /// # Safety
    /// Caller must hold the write borrow on this component.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn exclusive(&self) -> &mut dyn ErasedStorage {
        unsafe { &mut **self.inner.get() }
    }
}

/// Sparse component storage: a thin wrapper over [`EntityMap`].
///
/// Appropriate when components are small and access is entity-keyed random;
/// iteration-heavy large populations belong in the bucket storage.
pub struct SparseStorage<C> {
    entries: EntityMap<C>,
}

impl<C> SparseStorage<C> {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self {
            entries: EntityMap::new(),
        }
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no value is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `id` has a value.
    #[inline]
    pub fn has(&self, id: EntityId) -> bool {
        self.entries.contains(id)
    }

    /// Returns the value for `id`. Fatal if absent.
    #[inline]
    pub fn get(&self, id: EntityId) -> &C {
        &self.entries[id]
    }

    /// Returns the value for `id` mutably. Fatal if absent.
    #[inline]
    pub fn get_mut(&mut self, id: EntityId) -> &mut C {
        &mut self.entries[id]
    }

    /// Returns the value for `id`, if present.
    #[inline]
    pub fn get_if(&self, id: EntityId) -> Option<&C> {
        self.entries.lookup(id)
    }

    /// Returns the value for `id` mutably, if present.
    #[inline]
    pub fn get_if_mut(&mut self, id: EntityId) -> Option<&mut C> {
        self.entries.lookup_mut(id)
    }

    /// Stores `value` for `id`. Fatal if `id` already has a value.
    pub fn attach(&mut self, id: EntityId, value: C) -> &mut C {
        assert!(
            !self.entries.contains(id),
            "attach: entity {id} already has component {}",
            std::any::type_name::<C>()
        );
        self.entries.insert(id, value)
    }

    /// Destroys the value for `id`. Fatal if absent.
    pub fn detach(&mut self, id: EntityId) {
        let removed = self.entries.remove(id);
        assert!(
            removed,
            "detach: entity {id} has no component {}",
            std::any::type_name::<C>()
        );
    }
}

impl<C> Default for SparseStorage<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + Sync + 'static> ComponentStorage<C> for SparseStorage<C> {
    fn has(&self, id: EntityId) -> bool {
        SparseStorage::has(self, id)
    }

    fn get(&self, id: EntityId) -> &C {
        SparseStorage::get(self, id)
    }

    fn get_mut(&mut self, id: EntityId) -> &mut C {
        SparseStorage::get_mut(self, id)
    }

    fn get_if(&self, id: EntityId) -> Option<&C> {
        SparseStorage::get_if(self, id)
    }

    fn get_if_mut(&mut self, id: EntityId) -> Option<&mut C> {
        SparseStorage::get_if_mut(self, id)
    }

    fn attach(&mut self, id: EntityId, value: C) -> &mut C {
        SparseStorage::attach(self, id, value)
    }

    fn detach(&mut self, id: EntityId) {
        SparseStorage::detach(self, id)
    }

    fn len(&self) -> usize {
        SparseStorage::len(self)
    }
}

impl<C: Send + Sync + 'static> ErasedStorage for SparseStorage<C> {
    fn has(&self, id: EntityId) -> bool {
        SparseStorage::has(self, id)
    }

    fn detach(&mut self, id: EntityId) {
        SparseStorage::detach(self, id)
    }

    fn attach_boxed(&mut self, id: EntityId, value: Box<dyn Any + Send>) {
        let value = value.downcast::<C>().unwrap_or_else(|_| {
            panic!(
                "component value type mismatch for {}",
                std::any::type_name::<C>()
            )
        });
        SparseStorage::attach(self, id, *value);
    }

    fn component_name(&self) -> &'static str {
        std::any::type_name::<C>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

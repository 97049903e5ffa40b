//! Typed singleton resource slots with per-slot ownership.
//!
//! Resources are world-level singletons (clocks, configuration, shared
//! simulation state) registered at build time and constructed by the
//! initializer passed to `init`. Each slot records whether the stash owns
//! its value ([`construct_and_own`]) or merely points at one owned by the
//! embedding application ([`store_unowned`]).
//!
//! `init` succeeds only when [`all_initialized`] holds; a world never runs
//! with a hole in its resource table.
//!
//! [`construct_and_own`]: ResourceStash::construct_and_own
//! [`store_unowned`]: ResourceStash::store_unowned
//! [`all_initialized`]: ResourceStash::all_initialized

use std::any::{type_name, Any, TypeId};
use std::cell::UnsafeCell;
use std::collections::HashMap;

use crate::engine::types::{ResourceId, RESOURCE_CAP};

enum ResourceValue {
    Owned(Box<dyn Any + Send + Sync>),
    Unowned(*mut ()),
}

struct ResourceSlot {
    name: &'static str,
    type_id: TypeId,
    value: UnsafeCell<Option<ResourceValue>>,
}

/// Registry and store of world resources.
pub struct ResourceStash {
    ids: HashMap<TypeId, ResourceId>,
    slots: Vec<ResourceSlot>,
}

// Values are Send + Sync; unowned pointers are only dereferenced under the
// stash's borrow discipline, and the caller of `store_unowned` vouches for
// the pointee (see that method's contract). Slot cells are only written
// during initialization, behind `&mut self`.
unsafe impl Send for ResourceStash {}
unsafe impl Sync for ResourceStash {}

impl ResourceStash {
    pub(crate) fn new() -> Self {
        Self {
            ids: HashMap::new(),
            slots: Vec::new(),
        }
    }

    pub(crate) fn register<R: Send + Sync + 'static>(&mut self) -> ResourceId {
        let type_id = TypeId::of::<R>();
        assert!(
            !self.ids.contains_key(&type_id),
            "resource {} registered twice",
            type_name::<R>()
        );
        let id = self.slots.len();
        assert!(id < RESOURCE_CAP, "resource capacity ({RESOURCE_CAP}) exhausted");
        self.ids.insert(type_id, id as ResourceId);
        self.slots.push(ResourceSlot {
            name: type_name::<R>(),
            type_id,
            value: UnsafeCell::new(None),
        });
        id as ResourceId
    }

    /// Dense id of `R`. Fatal if `R` was never registered with this world.
    pub fn id_of<R: Send + Sync + 'static>(&self) -> ResourceId {
        self.lookup(TypeId::of::<R>()).unwrap_or_else(|| {
            panic!(
                "resource {} is not registered with this world",
                type_name::<R>()
            )
        })
    }

    pub(crate) fn lookup(&self, type_id: TypeId) -> Option<ResourceId> {
        self.ids.get(&type_id).copied()
    }

    /// Name of the resource in slot `id`.
    pub(crate) fn name(&self, id: ResourceId) -> &'static str {
        self.slots[id as usize].name
    }

    /// Number of registered resources.
    pub(crate) fn count(&self) -> usize {
        self.slots.len()
    }

    /// Builds `value` into the slot for `R` and takes ownership of it.
    /// Fatal if the slot is already filled.
    pub fn construct_and_own<R: Send + Sync + 'static>(&mut self, value: R) {
        let id = self.id_of::<R>();
        let slot = self.slots[id as usize].value.get_mut();
        assert!(
            slot.is_none(),
            "resource {} constructed twice",
            type_name::<R>()
        );
        *slot = Some(ResourceValue::Owned(Box::new(value)));
    }

    /// Points the slot for `R` at an externally-owned value. The stash never
    /// drops it. Fatal if the slot is already filled.
    ///
    /// # Safety
    /// `ptr` must be non-null, point at a valid `R`, and outlive the world;
    /// while the world exists the pointee must not be accessed except
    /// through this stash.
    pub unsafe fn store_unowned<R: Send + Sync + 'static>(&mut self, ptr: *mut R) {
        assert!(!ptr.is_null(), "store_unowned: null {} pointer", type_name::<R>());
        let id = self.id_of::<R>();
        let slot = self.slots[id as usize].value.get_mut();
        assert!(
            slot.is_none(),
            "resource {} constructed twice",
            type_name::<R>()
        );
        *slot = Some(ResourceValue::Unowned(ptr as *mut ()));
    }

    /// Returns `true` once every registered slot holds a value.
    pub fn all_initialized(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| unsafe { &*slot.value.get() }.is_some())
    }

    pub(crate) fn missing(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|slot| unsafe { &*slot.value.get() }.is_none())
            .map(|slot| slot.name)
            .collect()
    }

    /// Shared reference to `R`. Fatal if unregistered or unconstructed.
    pub fn get<R: Send + Sync + 'static>(&self) -> &R {
        let id = self.id_of::<R>();
        // Holding `&self` rules out concurrent slot writes; construction
        // only happens during init, behind `&mut self`.
        unsafe { self.slot_ref(id) }
    }

    /// Exclusive reference to `R`. Fatal if unregistered or unconstructed.
    pub fn get_mut<R: Send + Sync + 'static>(&mut self) -> &mut R {
        let id = self.id_of::<R>();
        unsafe { self.slot_mut(id) }
    }

    /// # Safety
    /// Caller must hold a read borrow on resource `id` or otherwise exclude
    /// concurrent writers.
    pub(crate) unsafe fn slot_ref<R: 'static>(&self, id: ResourceId) -> &R {
        let slot = &self.slots[id as usize];
        debug_assert_eq!(slot.type_id, TypeId::of::<R>());
        let value = unsafe { &*slot.value.get() }
            .as_ref()
            .unwrap_or_else(|| panic!("resource {} was never constructed", slot.name));
        match value {
            ResourceValue::Owned(boxed) => boxed
                .downcast_ref::<R>()
                .unwrap_or_else(|| panic!("resource slot type mismatch for {}", slot.name)),
            ResourceValue::Unowned(ptr) => unsafe { &*(*ptr as *const R) },
        }
    }

    /// # Safety
    /// Caller must hold the write borrow on resource `id` or otherwise have
    /// exclusive access.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slot_mut<R: 'static>(&self, id: ResourceId) -> &mut R {
        let slot = &self.slots[id as usize];
        debug_assert_eq!(slot.type_id, TypeId::of::<R>());
        let value = unsafe { &mut *slot.value.get() }
            .as_mut()
            .unwrap_or_else(|| panic!("resource {} was never constructed", slot.name));
        match value {
            ResourceValue::Owned(boxed) => boxed
                .downcast_mut::<R>()
                .unwrap_or_else(|| panic!("resource slot type mismatch for {}", slot.name)),
            ResourceValue::Unowned(ptr) => unsafe { &mut *(*ptr as *mut R) },
        }
    }
}

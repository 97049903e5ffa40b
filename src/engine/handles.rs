//! Capability handles built per system invocation.
//!
//! A running system touches the world only through [`SystemCtx`], which
//! hands out exactly the capabilities the system declared in its
//! [`Access`](crate::engine::system::Access): typed component readers and
//! writers, structural attach/detach handles, the entity builder and
//! destroyer, and resource references. Requesting an undeclared capability
//! is fatal.
//!
//! Handles are borrow-views: they hold references into the world for the
//! duration of the invocation and release their runtime borrow flags on
//! drop. The dispatcher outlives every handle it enables.
//!
//! ## Immediate vs deferred effects
//!
//! [`AttachComponent`] and [`DetachComponent`] mutate the component storage
//! immediately (the handle holds the component's exclusive borrow) and
//! queue the entity for the mask/follow update at the next drain.
//! [`EntityBuilder`] and [`EntityDestroyer`] are fully deferred: built
//! entities' values are buffered until the creation drain, and the death
//! row is only acted on by the destruction drain.

use std::ops::{Deref, DerefMut, Index, IndexMut};

use crate::engine::borrow::BorrowRelease;
use crate::engine::component::{Bundle, Component, ComponentRegistry};
use crate::engine::followed::{FollowedEntities, FollowedSet};
use crate::engine::queues::{PendingEntity, QueueRelease};
use crate::engine::storage::ComponentStorage;
use crate::engine::system::ResolvedAccess;
use crate::engine::types::{next_entity_id, ComponentId, ComponentMask, EntityId};
use crate::engine::world::World;

/// Per-invocation gateway between a system and the world.
pub struct SystemCtx<'w> {
    world: &'w World,
    access: &'w ResolvedAccess,
    followed: &'w FollowedSet,
    system_name: &'static str,
}

impl<'w> SystemCtx<'w> {
    pub(crate) fn new(
        world: &'w World,
        access: &'w ResolvedAccess,
        followed: &'w FollowedSet,
        system_name: &'static str,
    ) -> Self {
        Self {
            world,
            access,
            followed,
            system_name,
        }
    }

    /// View of the entities this system currently follows.
    pub fn entities(&self) -> FollowedEntities<'w> {
        FollowedEntities::new(self.followed, self.world.pool())
    }

    fn component_id<C: Component>(&self) -> ComponentId {
        self.world.components().id_of::<C>()
    }

    /// Immutable access to component `C`. Fatal if undeclared or
    /// write-borrowed.
    pub fn read<C: Component>(&self) -> ReadComponent<'w, C> {
        let component = self.component_id::<C>();
        let name = self.world.components().name(component);
        assert!(
            self.access.read_mask.test(component),
            "system {} did not declare read access to component {name}",
            self.system_name
        );
        let release =
            BorrowRelease::read(self.world.component_borrows(), component as usize, name);
        let storage = self.world.typed_storage::<C>(component);
        ReadComponent {
            storage,
            _borrow: release,
        }
    }

    /// Exclusive mutable access to component `C`. Fatal if undeclared or
    /// borrowed.
    pub fn write<C: Component>(&self) -> WriteComponent<'w, C> {
        let component = self.component_id::<C>();
        let name = self.world.components().name(component);
        assert!(
            self.access.write_mask.test(component),
            "system {} did not declare write access to component {name}",
            self.system_name
        );
        let release =
            BorrowRelease::write(self.world.component_borrows(), component as usize, name);
        let storage = unsafe { self.world.typed_storage_mut::<C>(component) };
        WriteComponent {
            storage,
            _borrow: release,
        }
    }

    /// Capability to attach component `C` to live entities. Fatal if
    /// undeclared; holds the component's exclusive borrow.
    pub fn attach<C: Component>(&self) -> AttachComponent<'w, C> {
        let component = self.component_id::<C>();
        let name = self.world.components().name(component);
        assert!(
            self.access.attach_mask.test(component),
            "system {} did not declare attach access to component {name}",
            self.system_name
        );
        let release =
            BorrowRelease::write(self.world.component_borrows(), component as usize, name);
        let storage = unsafe { self.world.typed_storage_mut::<C>(component) };
        let (queue, queue_release) = self.world.attach_queue(component).claim(name);
        AttachComponent {
            storage,
            queue,
            _borrow: release,
            _queue: queue_release,
        }
    }

    /// Capability to detach component `C` from live entities. Fatal if
    /// undeclared; holds the component's exclusive borrow.
    pub fn detach<C: Component>(&self) -> DetachComponent<'w, C> {
        let component = self.component_id::<C>();
        let name = self.world.components().name(component);
        assert!(
            self.access.detach_mask.test(component),
            "system {} did not declare detach access to component {name}",
            self.system_name
        );
        let release =
            BorrowRelease::write(self.world.component_borrows(), component as usize, name);
        let storage = unsafe { self.world.typed_storage_mut::<C>(component) };
        let (queue, queue_release) = self.world.detach_queue(component).claim(name);
        DetachComponent {
            storage,
            queue,
            _borrow: release,
            _queue: queue_release,
        }
    }

    /// Capability to build new entities. Fatal if undeclared.
    pub fn builder(&self) -> EntityBuilder<'w> {
        assert!(
            self.access.builds_entities,
            "system {} did not declare the entity-builder capability",
            self.system_name
        );
        let (pending, release) = self.world.creation_queue().claim("entity builder");
        EntityBuilder {
            registry: self.world.components(),
            pending,
            _claim: Some(release),
        }
    }

    /// Capability to destroy entities. Fatal if undeclared.
    pub fn destroyer(&self) -> EntityDestroyer<'w> {
        assert!(
            self.access.destroys_entities,
            "system {} did not declare the entity-destroyer capability",
            self.system_name
        );
        let (death_row, release) = self.world.death_row().claim("entity destroyer");
        EntityDestroyer {
            death_row,
            _claim: release,
        }
    }

    /// Immutable access to resource `R`. Fatal if undeclared or
    /// write-borrowed.
    pub fn resource<R: Send + Sync + 'static>(&self) -> ReadResource<'w, R> {
        let resource = self.world.resources().id_of::<R>();
        let name = self.world.resources().name(resource);
        assert!(
            self.access.resource_read_mask & (1u64 << resource) != 0,
            "system {} did not declare read access to resource {name}",
            self.system_name
        );
        let release =
            BorrowRelease::read(self.world.resource_borrows(), resource as usize, name);
        let value = unsafe { self.world.resources().slot_ref::<R>(resource) };
        ReadResource {
            value,
            _borrow: release,
        }
    }

    /// Exclusive mutable access to resource `R`. Fatal if undeclared or
    /// borrowed.
    pub fn resource_mut<R: Send + Sync + 'static>(&self) -> WriteResource<'w, R> {
        let resource = self.world.resources().id_of::<R>();
        let name = self.world.resources().name(resource);
        assert!(
            self.access.resource_write_mask & (1u64 << resource) != 0,
            "system {} did not declare write access to resource {name}",
            self.system_name
        );
        let release =
            BorrowRelease::write(self.world.resource_borrows(), resource as usize, name);
        let value = unsafe { self.world.resources().slot_mut::<R>(resource) };
        WriteResource {
            value,
            _borrow: release,
        }
    }
}

/// Immutable lookup into one component storage.
pub struct ReadComponent<'w, C: Component> {
    storage: &'w C::Storage,
    _borrow: BorrowRelease<'w>,
}

impl<C: Component> ReadComponent<'_, C> {
    /// Returns the component of `id`. Fatal if absent.
    #[inline]
    pub fn get(&self, id: EntityId) -> &C {
        self.storage.get(id)
    }

    /// Returns the component of `id`, if present.
    #[inline]
    pub fn get_if(&self, id: EntityId) -> Option<&C> {
        self.storage.get_if(id)
    }

    /// Returns `true` if `id` has the component.
    #[inline]
    pub fn has(&self, id: EntityId) -> bool {
        self.storage.has(id)
    }
}

impl<C: Component> Index<EntityId> for ReadComponent<'_, C> {
    type Output = C;

    fn index(&self, id: EntityId) -> &C {
        self.storage.get(id)
    }
}

/// Exclusive mutable lookup into one component storage.
pub struct WriteComponent<'w, C: Component> {
    storage: &'w mut C::Storage,
    _borrow: BorrowRelease<'w>,
}

impl<C: Component> WriteComponent<'_, C> {
    /// Returns the component of `id`. Fatal if absent.
    #[inline]
    pub fn get(&self, id: EntityId) -> &C {
        self.storage.get(id)
    }

    /// Returns the component of `id` mutably. Fatal if absent.
    #[inline]
    pub fn get_mut(&mut self, id: EntityId) -> &mut C {
        self.storage.get_mut(id)
    }

    /// Returns the component of `id`, if present.
    #[inline]
    pub fn get_if(&self, id: EntityId) -> Option<&C> {
        self.storage.get_if(id)
    }

    /// Returns the component of `id` mutably, if present.
    #[inline]
    pub fn get_if_mut(&mut self, id: EntityId) -> Option<&mut C> {
        self.storage.get_if_mut(id)
    }

    /// Returns `true` if `id` has the component.
    #[inline]
    pub fn has(&self, id: EntityId) -> bool {
        self.storage.has(id)
    }
}

impl<C: Component> WriteComponent<'_, C> {
    /// Applies `f` to the component of every entity in `entities`, one
    /// contiguous range per pool worker. Blocks until every range
    /// completes.
    ///
    /// Each id is visited exactly once, so every `&mut C` handed to `f`
    /// is disjoint; `f` only receives the component of the id it was
    /// called for.
    pub fn for_each_par(
        &mut self,
        entities: &FollowedEntities<'_>,
        f: impl Fn(EntityId, &mut C) + Send + Sync,
    ) {
        let storage = SendPtr(&mut *self.storage as *mut C::Storage);
        entities.for_each_par(move |id| {
            let storage = storage;
            let storage = unsafe { &mut *storage.0 };
            f(id, storage.get_mut(id));
        });
    }
}

// Lookups on disjoint ids resolve to disjoint slots, and the exclusive
// handle keeps any other access to the storage out for the duration.
struct SendPtr<T>(*mut T);

impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for SendPtr<T> {}
unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}

impl<C: Component> Index<EntityId> for WriteComponent<'_, C> {
    type Output = C;

    fn index(&self, id: EntityId) -> &C {
        self.storage.get(id)
    }
}

impl<C: Component> IndexMut<EntityId> for WriteComponent<'_, C> {
    fn index_mut(&mut self, id: EntityId) -> &mut C {
        self.storage.get_mut(id)
    }
}

/// Attaches component values to live entities.
///
/// The storage is updated immediately; the entity's mask and the follow
/// index catch up at this system's drain.
pub struct AttachComponent<'w, C: Component> {
    storage: &'w mut C::Storage,
    queue: &'w mut Vec<EntityId>,
    _borrow: BorrowRelease<'w>,
    _queue: QueueRelease<'w>,
}

impl<C: Component> AttachComponent<'_, C> {
    /// Attaches `value` to `id`. Fatal if `id` already has the component.
    pub fn attach(&mut self, id: EntityId, value: C) {
        self.storage.attach(id, value);
        self.queue.push(id);
    }
}

/// Detaches component values from live entities.
///
/// The storage is updated immediately; the entity's mask and the follow
/// index catch up at this system's drain.
pub struct DetachComponent<'w, C: Component> {
    storage: &'w mut C::Storage,
    queue: &'w mut Vec<EntityId>,
    _borrow: BorrowRelease<'w>,
    _queue: QueueRelease<'w>,
}

impl<C: Component> DetachComponent<'_, C> {
    /// Detaches the component from `id`. Fatal if absent.
    pub fn detach(&mut self, id: EntityId) {
        self.storage.detach(id);
        self.queue.push(id);
    }
}

/// Builds new entities, deferred to the creation drain.
pub struct EntityBuilder<'w> {
    registry: &'w ComponentRegistry,
    pending: &'w mut Vec<PendingEntity>,
    _claim: Option<QueueRelease<'w>>,
}

impl<'w> EntityBuilder<'w> {
    pub(crate) fn direct(
        registry: &'w ComponentRegistry,
        pending: &'w mut Vec<PendingEntity>,
    ) -> Self {
        Self {
            registry,
            pending,
            _claim: None,
        }
    }

    /// Allocates a fresh id and yields a skeleton to attach components to.
    ///
    /// The entity is *pending* until the next creation drain: its values are
    /// buffered, it has no mask-table entry, and no system follows it yet.
    pub fn new_entity(&mut self) -> EntitySkeleton<'_> {
        self.pending.push(PendingEntity {
            id: next_entity_id(),
            mask: ComponentMask::new(),
            bundle: Bundle::new(),
        });
        let entry = self
            .pending
            .last_mut()
            .expect("pending entity was just pushed");
        EntitySkeleton {
            registry: self.registry,
            entry,
        }
    }
}

/// Transient skeleton of one pending entity.
pub struct EntitySkeleton<'a> {
    registry: &'a ComponentRegistry,
    entry: &'a mut PendingEntity,
}

impl EntitySkeleton<'_> {
    /// Id the entity will carry once live.
    #[inline]
    pub fn id(&self) -> EntityId {
        self.entry.id
    }

    /// Adds `value` to the pending entity. Fatal if a value for the same
    /// component was already attached.
    pub fn attach<C: Component>(mut self, value: C) -> Self {
        let component = self.registry.id_of::<C>();
        assert!(
            !self.entry.mask.test(component),
            "pending entity {} already has component {}",
            self.entry.id,
            self.registry.name(component)
        );
        self.entry.mask.set(component);
        self.entry.bundle.insert(component, Box::new(value));
        self
    }
}

/// Marks entities for destruction at this system's drain.
pub struct EntityDestroyer<'w> {
    death_row: &'w mut Vec<EntityId>,
    _claim: QueueRelease<'w>,
}

impl EntityDestroyer<'_> {
    /// Requests destruction of `id`. Deferred; duplicate requests within
    /// one window collapse at the drain.
    pub fn destroy(&mut self, id: EntityId) {
        self.death_row.push(id);
    }
}

/// Shared reference to a resource.
pub struct ReadResource<'w, R> {
    value: &'w R,
    _borrow: BorrowRelease<'w>,
}

impl<R> Deref for ReadResource<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.value
    }
}

/// Exclusive reference to a resource.
pub struct WriteResource<'w, R> {
    value: &'w mut R,
    _borrow: BorrowRelease<'w>,
}

impl<R> Deref for WriteResource<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.value
    }
}

impl<R> DerefMut for WriteResource<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.value
    }
}

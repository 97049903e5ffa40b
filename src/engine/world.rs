//! The world: storages, the follow index, drains, and the dispatcher.
//!
//! A [`World`] owns everything a simulation needs per tick: one storage per
//! registered component, the entity mask table (source of truth for
//! entity→component-set membership), one followed set per system, the
//! structural queues, the resource stash, and the worker pool.
//!
//! ## Execution model
//!
//! Systems run either sequentially ([`run_sequential`]) or as a parallel
//! group ([`run_parallel`]). After a system (or after a parallel group
//! joins), the **post-processor** drains exactly the structural queues that
//! system's declared capabilities can have filled, reconciling storages, the
//! mask table, and every followed set. Between two sequential systems the
//! drain runs to completion, so the second system observes all structural
//! effects of the first. Siblings of a parallel group observe the pre-group
//! snapshot; their structural effects drain after the join, in group order.
//!
//! ## Parallel-group discipline
//!
//! `run_parallel` loudly refuses any group in which two systems declare
//! conflicting access: exclusive component access (writes, attaches,
//! detaches) overlapping any access to the same component, conflicting
//! resource access, two entity builders, or two entity destroyers. Within
//! the group, every structural queue therefore has at most one writer.
//!
//! [`run_sequential`]: World::run_sequential
//! [`run_parallel`]: World::run_parallel

use std::any::{type_name, TypeId};
use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::engine::borrow::BorrowFlags;
use crate::engine::component::{Component, ComponentRegistry};
use crate::engine::entity_map::EntityMap;
use crate::engine::error::WorldInitError;
use crate::engine::followed::FollowedSet;
use crate::engine::handles::{EntityBuilder, SystemCtx};
use crate::engine::queues::{PendingEntity, QueueCell, StructuralQueues};
use crate::engine::resource::ResourceStash;
use crate::engine::storage::StorageCell;
use crate::engine::system::{ResolvedAccess, System};
use crate::engine::types::{ComponentId, ComponentMask, EntityId, SystemId};

struct RegisteredSystem {
    system: Box<dyn System>,
    type_id: TypeId,
    name: &'static str,
    access: ResolvedAccess,
    followed: FollowedSet,
    active: bool,
}

/// Staged configuration for a [`World`].
///
/// Components, resources, and systems are registered in order; each gets a
/// dense id. [`init`](WorldBuilder::init) constructs the resources and
/// produces the world, or reports the unconstructed slots.
pub struct WorldBuilder {
    components: ComponentRegistry,
    storages: Vec<StorageCell>,
    systems: Vec<(Box<dyn System>, TypeId, &'static str)>,
    resources: ResourceStash,
    threads: Option<usize>,
}

impl WorldBuilder {
    /// Starts an empty configuration.
    pub fn new() -> Self {
        Self {
            components: ComponentRegistry::new(),
            storages: Vec::new(),
            systems: Vec::new(),
            resources: ResourceStash::new(),
            threads: None,
        }
    }

    /// Registers component `C` with its nominated storage.
    pub fn register_component<C: Component>(mut self) -> Self {
        self.components.register::<C>();
        self.storages
            .push(StorageCell::new(Box::new(C::Storage::default())));
        self
    }

    /// Registers resource `R`; `init`'s initializer must construct it.
    pub fn register_resource<R: Send + Sync + 'static>(mut self) -> Self {
        self.resources.register::<R>();
        self
    }

    /// Registers `system`; `tick` runs systems in registration order.
    pub fn add_system<S: System>(mut self, system: S) -> Self {
        let name = system.name();
        self.systems
            .push((Box::new(system), TypeId::of::<S>(), name));
        self
    }

    /// Sizes the worker pool. Defaults to
    /// `max(available_parallelism - 2, 1)`.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Runs `initializer` against the resource stash and produces the
    /// world. Fails with the names of any registered resources left
    /// unconstructed; no other side effects.
    pub fn init(
        self,
        initializer: impl FnOnce(&mut ResourceStash),
    ) -> Result<World, WorldInitError> {
        let WorldBuilder {
            components,
            storages,
            systems,
            mut resources,
            threads,
        } = self;

        initializer(&mut resources);
        let missing = resources.missing();
        if !missing.is_empty() {
            return Err(WorldInitError { missing });
        }

        let systems: Vec<RegisteredSystem> = systems
            .into_iter()
            .map(|(system, type_id, name)| {
                let access = system.access().resolve(&components, &resources, name);
                RegisteredSystem {
                    system,
                    type_id,
                    name,
                    access,
                    followed: FollowedSet::new(),
                    active: true,
                }
            })
            .collect();

        let threads = threads.unwrap_or_else(default_thread_count);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap_or_else(|error| panic!("failed to build worker pool: {error}"));

        let component_count = components.count();
        debug!(
            components = component_count,
            systems = systems.len(),
            resources = resources.count(),
            threads,
            "world initialized"
        );

        Ok(World {
            components,
            storages,
            masks: EntityMap::new(),
            queues: StructuralQueues::new(component_count),
            systems,
            resources,
            component_borrows: BorrowFlags::new(component_count),
            resource_borrows: BorrowFlags::new(RESOURCE_FLAGS),
            pool,
        })
    }

    /// [`init`](Self::init) with an empty initializer, for worlds whose
    /// resources need no construction.
    pub fn build(self) -> Result<World, WorldInitError> {
        self.init(|_| {})
    }
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

const RESOURCE_FLAGS: usize = crate::engine::types::RESOURCE_CAP;

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|threads| threads.get())
        .unwrap_or(1)
        .saturating_sub(2)
        .max(1)
}

/// The ECS world.
pub struct World {
    components: ComponentRegistry,
    storages: Vec<StorageCell>,
    masks: EntityMap<ComponentMask>,
    queues: StructuralQueues,
    systems: Vec<RegisteredSystem>,
    resources: ResourceStash,
    component_borrows: BorrowFlags,
    resource_borrows: BorrowFlags,
    pool: rayon::ThreadPool,
}

impl World {
    /// Starts a [`WorldBuilder`].
    pub fn builder() -> WorldBuilder {
        WorldBuilder::new()
    }

    // ── introspection ───────────────────────────────────────────────────

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.masks.len()
    }

    /// Returns `true` if `id` is live.
    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.masks.contains(id)
    }

    /// Component mask of `id`, if live.
    pub fn component_mask(&self, id: EntityId) -> Option<ComponentMask> {
        self.masks.lookup(id).copied()
    }

    /// Returns `true` if live entity `id` carries component `C`, per the
    /// mask table.
    pub fn has_component<C: Component>(&self, id: EntityId) -> bool {
        let component = self.components.id_of::<C>();
        self.masks
            .lookup(id)
            .map_or(false, |mask| mask.test(component))
    }

    /// Ids of all live entities, ascending.
    pub fn live_entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.masks.iter().map(|(id, _)| id).collect();
        ids.sort_unstable();
        ids
    }

    /// The component registry.
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// The resource stash.
    pub fn resources(&self) -> &ResourceStash {
        &self.resources
    }

    /// Shared reference to resource `R`.
    pub fn resource<R: Send + Sync + 'static>(&self) -> &R {
        self.resources.get::<R>()
    }

    /// Exclusive reference to resource `R`.
    pub fn resource_mut<R: Send + Sync + 'static>(&mut self) -> &mut R {
        self.resources.get_mut::<R>()
    }

    /// Shared reference to the storage of component `C`.
    pub fn storage<C: Component>(&self) -> &C::Storage {
        let component = self.components.id_of::<C>();
        self.typed_storage::<C>(component)
    }

    /// Exclusive reference to the storage of component `C`.
    ///
    /// Maintenance entry point: bucket defragmentation runs through this,
    /// exclusively, between ticks.
    pub fn storage_mut<C: Component>(&mut self) -> &mut C::Storage {
        let component = self.components.id_of::<C>();
        let name = self.components.name(component);
        self.storages[component as usize]
            .get_mut()
            .as_any_mut()
            .downcast_mut::<C::Storage>()
            .unwrap_or_else(|| panic!("storage type mismatch for component {name}"))
    }

    /// Dense id of system `S`. Fatal if unregistered.
    pub fn system_id<S: System>(&self) -> SystemId {
        self.systems
            .iter()
            .position(|entry| entry.type_id == TypeId::of::<S>())
            .unwrap_or_else(|| {
                panic!("system {} is not registered with this world", type_name::<S>())
            }) as SystemId
    }

    /// Followed set of system `S`.
    pub fn followed<S: System>(&self) -> &FollowedSet {
        let id = self.system_id::<S>();
        &self.systems[id as usize].followed
    }

    /// Activates or deactivates system `S`; `tick` and the dispatchers skip
    /// inactive systems.
    pub fn set_system_active<S: System>(&mut self, active: bool) {
        let id = self.system_id::<S>();
        self.systems[id as usize].active = active;
    }

    // ── dispatch ────────────────────────────────────────────────────────

    /// Passes an [`EntityBuilder`] to `f`, then drains the creations.
    pub fn build_entities(&mut self, f: impl FnOnce(&mut EntityBuilder<'_>)) {
        {
            let mut builder =
                EntityBuilder::direct(&self.components, self.queues.new_entities.get_mut());
            f(&mut builder);
        }
        self.drain_created();
    }

    /// Runs all registered systems sequentially, in registration order.
    pub fn tick(&mut self) {
        let all: Vec<SystemId> = (0..self.systems.len() as SystemId).collect();
        self.run_sequential(&all);
    }

    /// Runs `systems` in order; each system's structural effects drain
    /// before the next system starts.
    pub fn run_sequential(&mut self, systems: &[SystemId]) {
        for &system in systems {
            self.run_one(system);
            self.drain_for(system);
        }
    }

    /// Runs `systems` concurrently on the worker pool, joins, then drains
    /// each system's structural effects in the order given.
    ///
    /// Fatal if any two systems of the group declare conflicting access.
    pub fn run_parallel(&mut self, systems: &[SystemId]) {
        for (position, &first) in systems.iter().enumerate() {
            for &second in &systems[position + 1..] {
                let a = &self.systems[first as usize];
                let b = &self.systems[second as usize];
                assert!(
                    !a.access.conflicts_with(&b.access),
                    "systems {} and {} declare conflicting access and cannot share a parallel group",
                    a.name,
                    b.name
                );
            }
        }

        trace!(group = systems.len(), "running parallel group");
        let world: &World = self;
        self.pool.install(|| {
            systems.par_iter().for_each(|&system| world.run_one(system));
        });

        for &system in systems {
            self.drain_for(system);
        }
    }

    fn run_one(&self, system: SystemId) {
        let entry = &self.systems[system as usize];
        if !entry.active {
            return;
        }
        let ctx = SystemCtx::new(self, &entry.access, &entry.followed, entry.name);
        entry.system.run(&ctx);
    }

    // ── post-processing ─────────────────────────────────────────────────

    /// Drains the structural queues the declared capabilities of `system`
    /// can have filled. Steps run creation → attach → detach → destruction;
    /// each is independent and a no-op on an empty queue.
    fn drain_for(&mut self, system: SystemId) {
        let entry = &self.systems[system as usize];
        if !entry.active {
            return;
        }
        let access = entry.access.clone();

        if access.builds_entities {
            self.drain_created();
        }
        for component in access.attach_mask.bits() {
            self.drain_attached(component);
        }
        for component in access.detach_mask.bits() {
            self.drain_detached(component);
        }
        if access.destroys_entities {
            self.drain_destroyed();
        }
    }

    fn drain_created(&mut self) {
        let pending = std::mem::take(self.queues.new_entities.get_mut());
        if pending.is_empty() {
            return;
        }
        trace!(created = pending.len(), "draining created entities");

        let mut by_mask: HashMap<ComponentMask, Vec<EntityId>> = HashMap::new();
        for entity in pending {
            let PendingEntity { id, mask, bundle } = entity;
            for (component, value) in bundle.into_parts() {
                self.storages[component as usize]
                    .get_mut()
                    .attach_boxed(id, value);
            }
            debug_assert!(
                !self.masks.contains(id),
                "entity {id} already live during creation drain"
            );
            self.masks.insert(id, mask);
            by_mask.entry(mask).or_default().push(id);
        }

        // A system may match several mask groups whose id runs interleave;
        // its batch is sorted before the bulk append.
        for entry in &mut self.systems {
            let mut batch: Vec<EntityId> = Vec::new();
            for (mask, ids) in &by_mask {
                if entry.access.subscription_mask.is_subset_of(mask) {
                    batch.extend_from_slice(ids);
                }
            }
            if !batch.is_empty() {
                batch.sort_unstable();
                entry.followed.append_newest(&batch);
            }
        }
    }

    fn drain_attached(&mut self, component: ComponentId) {
        let mut ids = std::mem::take(self.queues.attached[component as usize].get_mut());
        if ids.is_empty() {
            return;
        }
        ids.sort_unstable();
        ids.dedup();

        for &id in &ids {
            let mask = self.masks.lookup_mut(id).unwrap_or_else(|| {
                panic!("component attached to unknown entity {id}")
            });
            mask.set(component);
        }

        let masks = &self.masks;
        for entry in &mut self.systems {
            if !entry.access.subscription_mask.test(component) {
                continue;
            }
            let subscription = entry.access.subscription_mask;
            let satisfied: Vec<EntityId> = ids
                .iter()
                .copied()
                .filter(|&id| subscription.is_subset_of(&masks[id]))
                .collect();
            if !satisfied.is_empty() {
                entry.followed.merge_insert(&satisfied);
            }
        }
    }

    fn drain_detached(&mut self, component: ComponentId) {
        let mut ids = std::mem::take(self.queues.detached[component as usize].get_mut());
        if ids.is_empty() {
            return;
        }
        ids.sort_unstable();
        ids.dedup();

        for &id in &ids {
            let mask = self.masks.lookup_mut(id).unwrap_or_else(|| {
                panic!("component detached from unknown entity {id}")
            });
            mask.unset(component);
        }

        for entry in &mut self.systems {
            if entry.access.subscription_mask.test(component) {
                entry.followed.difference_remove(&ids);
            }
        }
    }

    fn drain_destroyed(&mut self) {
        let mut dead = std::mem::take(self.queues.death_row.get_mut());
        if dead.is_empty() {
            return;
        }
        dead.sort_unstable();
        dead.dedup();
        trace!(destroyed = dead.len(), "draining destroyed entities");

        let mut by_mask: HashMap<ComponentMask, Vec<EntityId>> = HashMap::new();
        for &id in &dead {
            let mask = *self
                .masks
                .lookup(id)
                .unwrap_or_else(|| panic!("destruction requested for unknown entity {id}"));
            self.masks.remove(id);
            for component in mask.bits() {
                self.storages[component as usize].get_mut().detach(id);
            }
            by_mask.entry(mask).or_default().push(id);
        }

        for (mask, ids) in &by_mask {
            for entry in &mut self.systems {
                if entry.access.subscription_mask.is_subset_of(mask) {
                    entry.followed.difference_remove(ids);
                }
            }
        }
    }

    // ── crate-internal access for capability handles ────────────────────

    pub(crate) fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }

    pub(crate) fn component_borrows(&self) -> &BorrowFlags {
        &self.component_borrows
    }

    pub(crate) fn resource_borrows(&self) -> &BorrowFlags {
        &self.resource_borrows
    }

    pub(crate) fn attach_queue(&self, component: ComponentId) -> &QueueCell<Vec<EntityId>> {
        &self.queues.attached[component as usize]
    }

    pub(crate) fn detach_queue(&self, component: ComponentId) -> &QueueCell<Vec<EntityId>> {
        &self.queues.detached[component as usize]
    }

    pub(crate) fn creation_queue(&self) -> &QueueCell<Vec<PendingEntity>> {
        &self.queues.new_entities
    }

    pub(crate) fn death_row(&self) -> &QueueCell<Vec<EntityId>> {
        &self.queues.death_row
    }

    pub(crate) fn typed_storage<C: Component>(&self, component: ComponentId) -> &C::Storage {
        let erased = unsafe { self.storages[component as usize].shared() };
        erased
            .as_any()
            .downcast_ref::<C::Storage>()
            .unwrap_or_else(|| {
                panic!(
                    "storage type mismatch for component {}",
                    self.components.name(component)
                )
            })
    }

    /// # Safety
    /// Caller must hold the write borrow on `component`.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn typed_storage_mut<C: Component>(
        &self,
        component: ComponentId,
    ) -> &mut C::Storage {
        let erased = unsafe { self.storages[component as usize].exclusive() };
        erased
            .as_any_mut()
            .downcast_mut::<C::Storage>()
            .unwrap_or_else(|| {
                panic!(
                    "storage type mismatch for component {}",
                    self.components.name(component)
                )
            })
    }
}

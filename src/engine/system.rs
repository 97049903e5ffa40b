//! System abstractions and declared access sets.
//!
//! A **system** is a unit of per-tick logic that:
//! - subscribes to a set of components (its followed entities are exactly
//!   the live entities carrying all of them),
//! - declares every capability it will exercise: component reads and
//!   writes, structural attach/detach, entity building and destruction,
//!   resource access,
//! - runs against a [`SystemCtx`] that hands out exactly the declared
//!   capability handles.
//!
//! ## Why declarations
//!
//! The declaration drives three mechanisms:
//! - the dispatcher's parallel-group check: two systems whose declared
//!   accesses conflict are refused a shared group, loudly;
//! - the post-processor: only the drain steps matching a system's declared
//!   structural capabilities run after it;
//! - handle construction: requesting an undeclared capability is fatal.
//!
//! Systems must be `Send + Sync`; parallel groups execute them on worker
//! threads.

use std::any::{type_name, TypeId};

use crate::engine::component::{Component, ComponentRegistry};
use crate::engine::handles::SystemCtx;
use crate::engine::resource::ResourceStash;
use crate::engine::types::ComponentMask;

/// A unit of executable logic operating on the world.
pub trait System: Send + Sync + 'static {
    /// Human-readable name, used in diagnostics.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    /// Subscriptions and capabilities this system exercises.
    fn access(&self) -> Access;

    /// Executes the system against the current world snapshot.
    fn run(&self, ctx: &SystemCtx<'_>);
}

#[derive(Clone, Copy, Debug)]
struct TypeEntry {
    type_id: TypeId,
    name: &'static str,
}

impl TypeEntry {
    fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Builder-style declaration of a system's subscriptions and capabilities.
///
/// ```
/// use flock_ecs::Access;
/// # use flock_ecs::{Component, SparseStorage};
/// # struct Position; impl Component for Position { type Storage = SparseStorage<Self>; }
/// # struct Velocity; impl Component for Velocity { type Storage = SparseStorage<Self>; }
/// # struct DeltaTime(f32);
///
/// let access = Access::new()
///     .subscribes::<Position>()
///     .subscribes::<Velocity>()
///     .writes::<Position>()
///     .reads::<Velocity>()
///     .reads_resource::<DeltaTime>();
/// ```
#[derive(Clone, Debug, Default)]
pub struct Access {
    subscriptions: Vec<TypeEntry>,
    reads: Vec<TypeEntry>,
    writes: Vec<TypeEntry>,
    attaches: Vec<TypeEntry>,
    detaches: Vec<TypeEntry>,
    resource_reads: Vec<TypeEntry>,
    resource_writes: Vec<TypeEntry>,
    builds_entities: bool,
    destroys_entities: bool,
}

impl Access {
    /// Starts an empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to component `C`; the system follows entities carrying
    /// every subscribed component.
    pub fn subscribes<C: Component>(mut self) -> Self {
        self.subscriptions.push(TypeEntry::of::<C>());
        self
    }

    /// Declares immutable access to component `C`.
    pub fn reads<C: Component>(mut self) -> Self {
        self.reads.push(TypeEntry::of::<C>());
        self
    }

    /// Declares exclusive mutable access to component `C`.
    pub fn writes<C: Component>(mut self) -> Self {
        self.writes.push(TypeEntry::of::<C>());
        self
    }

    /// Declares the capability to attach component `C` to live entities.
    pub fn attaches<C: Component>(mut self) -> Self {
        self.attaches.push(TypeEntry::of::<C>());
        self
    }

    /// Declares the capability to detach component `C` from live entities.
    pub fn detaches<C: Component>(mut self) -> Self {
        self.detaches.push(TypeEntry::of::<C>());
        self
    }

    /// Declares immutable access to resource `R`.
    pub fn reads_resource<R: Send + Sync + 'static>(mut self) -> Self {
        self.resource_reads.push(TypeEntry::of::<R>());
        self
    }

    /// Declares exclusive mutable access to resource `R`.
    pub fn writes_resource<R: Send + Sync + 'static>(mut self) -> Self {
        self.resource_writes.push(TypeEntry::of::<R>());
        self
    }

    /// Declares the capability to build new entities.
    pub fn builds_entities(mut self) -> Self {
        self.builds_entities = true;
        self
    }

    /// Declares the capability to destroy entities.
    pub fn destroys_entities(mut self) -> Self {
        self.destroys_entities = true;
        self
    }

    pub(crate) fn resolve(
        &self,
        components: &ComponentRegistry,
        resources: &ResourceStash,
        system_name: &'static str,
    ) -> ResolvedAccess {
        let component_bit = |entry: &TypeEntry| {
            components.lookup(entry.type_id).unwrap_or_else(|| {
                panic!(
                    "system {system_name} declares access to unregistered component {}",
                    entry.name
                )
            })
        };
        let resource_bit = |entry: &TypeEntry| {
            resources.lookup(entry.type_id).unwrap_or_else(|| {
                panic!(
                    "system {system_name} declares access to unregistered resource {}",
                    entry.name
                )
            })
        };

        let mut resolved = ResolvedAccess {
            builds_entities: self.builds_entities,
            destroys_entities: self.destroys_entities,
            ..ResolvedAccess::default()
        };
        for entry in &self.subscriptions {
            resolved.subscription_mask.set(component_bit(entry));
        }
        for entry in &self.reads {
            resolved.read_mask.set(component_bit(entry));
        }
        for entry in &self.writes {
            resolved.write_mask.set(component_bit(entry));
        }
        for entry in &self.attaches {
            resolved.attach_mask.set(component_bit(entry));
        }
        for entry in &self.detaches {
            resolved.detach_mask.set(component_bit(entry));
        }
        for entry in &self.resource_reads {
            resolved.resource_read_mask |= 1u64 << resource_bit(entry);
        }
        for entry in &self.resource_writes {
            resolved.resource_write_mask |= 1u64 << resource_bit(entry);
        }
        resolved
    }
}

/// A system's declaration resolved against a world's registries.
#[derive(Clone, Debug, Default)]
pub(crate) struct ResolvedAccess {
    pub subscription_mask: ComponentMask,
    pub read_mask: ComponentMask,
    pub write_mask: ComponentMask,
    pub attach_mask: ComponentMask,
    pub detach_mask: ComponentMask,
    pub resource_read_mask: u64,
    pub resource_write_mask: u64,
    pub builds_entities: bool,
    pub destroys_entities: bool,
}

impl ResolvedAccess {
    /// Components this system must hold exclusively. Attaching and detaching
    /// mutate the storage immediately, so they count as writes.
    pub fn exclusive_mask(&self) -> ComponentMask {
        let mut mask = self.write_mask;
        mask.merge(&self.attach_mask);
        mask.merge(&self.detach_mask);
        mask
    }

    /// Returns `true` if the two systems cannot share a parallel group.
    ///
    /// Conflicts: exclusive/exclusive or exclusive/shared component access,
    /// the same for resources, two entity builders, two entity destroyers.
    pub fn conflicts_with(&self, other: &ResolvedAccess) -> bool {
        let mine = self.exclusive_mask();
        let theirs = other.exclusive_mask();
        if mine.intersects(&theirs)
            || mine.intersects(&other.read_mask)
            || self.read_mask.intersects(&theirs)
        {
            return true;
        }
        if (self.resource_write_mask & other.resource_write_mask) != 0
            || (self.resource_write_mask & other.resource_read_mask) != 0
            || (self.resource_read_mask & other.resource_write_mask) != 0
        {
            return true;
        }
        (self.builds_entities && other.builds_entities)
            || (self.destroys_entities && other.destroys_entities)
    }
}

/// A [`System`] backed by a function or closure.
///
/// Lets simulation logic be registered without a dedicated type:
///
/// ```no_run
/// # use flock_ecs::{Access, FnSystem, WorldBuilder};
/// let mut world = WorldBuilder::new()
///     .add_system(FnSystem::new("noop", Access::new(), |_ctx| {}))
///     .build()
///     .unwrap();
/// ```
pub struct FnSystem<F>
where
    F: Fn(&SystemCtx<'_>) + Send + Sync + 'static,
{
    name: &'static str,
    access: Access,
    run: F,
}

impl<F> FnSystem<F>
where
    F: Fn(&SystemCtx<'_>) + Send + Sync + 'static,
{
    /// Creates a function-backed system.
    pub fn new(name: &'static str, access: Access, run: F) -> Self {
        Self { name, access, run }
    }
}

impl<F> System for FnSystem<F>
where
    F: Fn(&SystemCtx<'_>) + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn access(&self) -> Access {
        self.access.clone()
    }

    fn run(&self, ctx: &SystemCtx<'_>) {
        (self.run)(ctx)
    }
}

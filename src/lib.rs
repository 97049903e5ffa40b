//! # flock-ecs
//!
//! Data-oriented Entity–Component–System runtime for simulations that update
//! large populations of uniform entities (10^4–10^6) each tick through a
//! fixed pipeline of systems.
//!
//! ## Design Goals
//! - Typed per-component storage keyed by entity identity: a sparse
//!   robin-hood map and a bucketed dense array with stable handles and
//!   explicit defragmentation
//! - A subscription index handing each system exactly the entities that
//!   carry its required components
//! - Batched structural changes: creates, destroys, attaches, and detaches
//!   drain between system invocations, so systems always see a consistent
//!   snapshot
//! - Sequential and parallel dispatch with declared read/write discipline
//!
//! ## Example
//!
//! ```
//! use flock_ecs::prelude::*;
//!
//! struct Position { x: f32, y: f32 }
//! impl Component for Position {
//!     type Storage = BucketStorage<Self, 1000>;
//! }
//!
//! struct Velocity { x: f32, y: f32 }
//! impl Component for Velocity {
//!     type Storage = BucketStorage<Self, 1000>;
//! }
//!
//! struct DeltaTime(f32);
//!
//! struct Translation;
//!
//! impl System for Translation {
//!     fn access(&self) -> Access {
//!         Access::new()
//!             .subscribes::<Position>()
//!             .subscribes::<Velocity>()
//!             .writes::<Position>()
//!             .reads::<Velocity>()
//!             .reads_resource::<DeltaTime>()
//!     }
//!
//!     fn run(&self, ctx: &SystemCtx<'_>) {
//!         let mut position = ctx.write::<Position>();
//!         let velocity = ctx.read::<Velocity>();
//!         let dt = ctx.resource::<DeltaTime>().0;
//!         ctx.entities().for_each(|id| {
//!             position[id].x += dt * velocity[id].x;
//!             position[id].y += dt * velocity[id].y;
//!         });
//!     }
//! }
//!
//! let mut world = WorldBuilder::new()
//!     .register_component::<Position>()
//!     .register_component::<Velocity>()
//!     .register_resource::<DeltaTime>()
//!     .add_system(Translation)
//!     .init(|resources| resources.construct_and_own(DeltaTime(0.016)))
//!     .unwrap();
//!
//! world.build_entities(|builder| {
//!     for _ in 0..1000 {
//!         builder
//!             .new_entity()
//!             .attach(Position { x: 0.0, y: 0.0 })
//!             .attach(Velocity { x: 1.0, y: 1.0 });
//!     }
//! });
//!
//! world.tick();
//! assert_eq!(world.entity_count(), 1000);
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::bucket::{BucketStorage, Handle};
pub use engine::component::{Bundle, Component, ComponentRegistry};
pub use engine::entity_map::{EntityMap, DEFAULT_MAP_CAPACITY, MAX_LOAD_FACTOR};
pub use engine::error::WorldInitError;
pub use engine::followed::{FollowedEntities, FollowedSet};
pub use engine::handles::{
    AttachComponent, DetachComponent, EntityBuilder, EntityDestroyer, EntitySkeleton,
    ReadComponent, ReadResource, SystemCtx, WriteComponent, WriteResource,
};
pub use engine::resource::ResourceStash;
pub use engine::storage::{ComponentStorage, ErasedStorage, SparseStorage};
pub use engine::system::{Access, FnSystem, System};
pub use engine::types::{
    next_entity_id, ComponentId, ComponentMask, EntityId, ResourceId, SystemId, COMPONENT_CAP,
    EMPTY_KEY, FIRST_ENTITY_ID, NO_ENTITY, NO_OPEN_SLOT, RESOURCE_CAP, TOMBSTONE_KEY,
};
pub use engine::world::{World, WorldBuilder};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use flock_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Access, BucketStorage, Component, EntityId, FnSystem, SparseStorage, System, SystemCtx,
        SystemId, World, WorldBuilder,
    };
}

//! Component registration and the per-world component registry.
//!
//! A component is a plain user type that nominates its storage at definition
//! time through the [`Component`] trait. Worlds assign each registered
//! component a dense [`ComponentId`] in registration order; those ids index
//! the storage table, the structural queues, and the bits of every
//! [`ComponentMask`](crate::engine::types::ComponentMask).
//!
//! The registry is per-world. Independent worlds (and independent tests) can
//! register disjoint component sets without coordinating; only the entity id
//! allocator is process-wide.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use crate::engine::storage::{ComponentStorage, ErasedStorage};
use crate::engine::types::{ComponentId, COMPONENT_CAP};

/// A component type: a user record plus its storage choice.
///
/// ```
/// use flock_ecs::{BucketStorage, Component};
///
/// struct Position {
///     x: f32,
///     y: f32,
/// }
///
/// impl Component for Position {
///     type Storage = BucketStorage<Self, 1000>;
/// }
/// ```
pub trait Component: Send + Sync + Sized + 'static {
    /// Concrete storage backing this component.
    type Storage: ComponentStorage<Self> + ErasedStorage;
}

/// Per-world table mapping component types to dense ids.
pub struct ComponentRegistry {
    ids: HashMap<TypeId, ComponentId>,
    names: Vec<&'static str>,
}

impl ComponentRegistry {
    pub(crate) fn new() -> Self {
        Self {
            ids: HashMap::new(),
            names: Vec::new(),
        }
    }

    /// Registers `C` and returns its dense id. Fatal if `C` is already
    /// registered or the component capacity is exhausted.
    pub(crate) fn register<C: Component>(&mut self) -> ComponentId {
        let type_id = TypeId::of::<C>();
        assert!(
            !self.ids.contains_key(&type_id),
            "component {} registered twice",
            type_name::<C>()
        );
        let id = self.names.len();
        assert!(id < COMPONENT_CAP, "component capacity ({COMPONENT_CAP}) exhausted");
        self.ids.insert(type_id, id as ComponentId);
        self.names.push(type_name::<C>());
        id as ComponentId
    }

    /// Dense id of `C`. Fatal if `C` was never registered with this world.
    pub fn id_of<C: Component>(&self) -> ComponentId {
        self.lookup(TypeId::of::<C>()).unwrap_or_else(|| {
            panic!(
                "component {} is not registered with this world",
                type_name::<C>()
            )
        })
    }

    pub(crate) fn lookup(&self, type_id: TypeId) -> Option<ComponentId> {
        self.ids.get(&type_id).copied()
    }

    /// Name of the component with dense id `id`.
    pub fn name(&self, id: ComponentId) -> &'static str {
        self.names[id as usize]
    }

    /// Number of registered components.
    #[inline]
    pub fn count(&self) -> usize {
        self.names.len()
    }
}

/// Type-erased group of component values keyed by dense id.
///
/// Accumulated by the entity skeleton during building and consumed by the
/// creation drain, which routes each value into its storage.
#[derive(Default)]
pub struct Bundle {
    values: Vec<(ComponentId, Box<dyn Any + Send>)>,
}

impl Bundle {
    /// Creates an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value for component `component`.
    pub fn insert(&mut self, component: ComponentId, value: Box<dyn Any + Send>) {
        self.values.push((component, value));
    }

    /// Returns `true` if the bundle holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn into_parts(self) -> Vec<(ComponentId, Box<dyn Any + Send>)> {
        self.values
    }
}

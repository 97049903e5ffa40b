//! Core identifiers, sentinels, and the component bitmask.
//!
//! This module defines the **fundamental types** shared by every subsystem of
//! the engine: entity identifiers and their process-wide allocator, the dense
//! numeric ids handed out for components, systems, and resources, the reserved
//! sentinel values baked into the storage formats, and the fixed-width
//! [`ComponentMask`] used for subscription matching.
//!
//! ## Identifier model
//!
//! - An [`EntityId`] is an opaque `u32` handed out by a monotonically
//!   increasing process-wide counter. Ids are never reused; two worlds in the
//!   same process never observe the same id.
//! - Components, systems, and resources receive small dense indices at world
//!   build time ([`ComponentId`], [`SystemId`], [`ResourceId`]). These index
//!   directly into per-world tables.
//!
//! ## Reserved values
//!
//! The entity-map storage reserves two key values, so the allocator starts
//! at [`FIRST_ENTITY_ID`]:
//!
//! | value | meaning |
//! |------:|---------|
//! | `0` | empty slot ([`EMPTY_KEY`]) |
//! | `1` | tombstone ([`TOMBSTONE_KEY`]) |
//! | `u32::MAX` | unoccupied bucket slot ([`NO_ENTITY`]) |
//!
//! ## Invariants
//!
//! - For every live entity, bit `j` of its mask is set iff the storage of
//!   component `j` currently holds a value for it.
//! - A system's subscription mask has exactly the bits of its subscribed
//!   components.

use std::sync::atomic::{AtomicU32, Ordering};

/// Opaque identifier for a simulation entity.
pub type EntityId = u32;

/// Dense index of a registered component type.
pub type ComponentId = u16;

/// Dense index of a registered system.
pub type SystemId = u16;

/// Dense index of a registered resource.
pub type ResourceId = u16;

/// Entity-map key marking an empty slot.
pub const EMPTY_KEY: EntityId = 0;

/// Entity-map key marking a removed (tombstoned) slot.
pub const TOMBSTONE_KEY: EntityId = 1;

/// First id the allocator hands out; `0` and `1` are reserved keys.
pub const FIRST_ENTITY_ID: EntityId = 2;

/// Bucket-slot sentinel for "no entity stored here".
pub const NO_ENTITY: EntityId = EntityId::MAX;

/// Bucket hint sentinel for "no open slot in this bucket".
pub const NO_OPEN_SLOT: u16 = u16::MAX;

/// Maximum number of component types a world may register.
pub const COMPONENT_CAP: usize = 128;

/// Number of `u64` words in a [`ComponentMask`].
pub const MASK_WORDS: usize = COMPONENT_CAP / 64;

/// Maximum number of resource types a world may register.
pub const RESOURCE_CAP: usize = 64;

static NEXT_ENTITY_ID: AtomicU32 = AtomicU32::new(FIRST_ENTITY_ID);

/// Allocates a fresh entity id.
///
/// Ids are process-wide, monotonically increasing, and never reused.
/// Exhausting the 32-bit id space is fatal.
#[inline]
pub fn next_entity_id() -> EntityId {
    let id = NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed);
    assert!(id < NO_ENTITY, "entity id space exhausted");
    id
}

/// Fixed-width bitmask over the world's registered component types.
///
/// One mask is stored per live entity (the entity mask table) and one per
/// system (the subscription mask). Masks are `Copy`, compare by value, and
/// hash; the creation queue groups pending entities by mask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct ComponentMask {
    words: [u64; MASK_WORDS],
}

impl ComponentMask {
    /// Returns the empty mask.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bit for `component`.
    #[inline]
    pub fn set(&mut self, component: ComponentId) {
        let index = (component as usize) / 64;
        let bit = (component as usize) % 64;
        self.words[index] |= 1u64 << bit;
    }

    /// Clears the bit for `component`.
    #[inline]
    pub fn unset(&mut self, component: ComponentId) {
        let index = (component as usize) / 64;
        let bit = (component as usize) % 64;
        self.words[index] &= !(1u64 << bit);
    }

    /// Returns `true` if the bit for `component` is set.
    #[inline]
    pub fn test(&self, component: ComponentId) -> bool {
        let index = (component as usize) / 64;
        let bit = (component as usize) % 64;
        (self.words[index] >> bit) & 1 == 1
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Returns `true` if every bit of `self` is also set in `other`.
    #[inline]
    pub fn is_subset_of(&self, other: &ComponentMask) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(mine, theirs)| (mine & theirs) == *mine)
    }

    /// Returns `true` if `self` and `other` share any bit.
    #[inline]
    pub fn intersects(&self, other: &ComponentMask) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(mine, theirs)| (mine & theirs) != 0)
    }

    /// Sets every bit of `other` in `self`.
    #[inline]
    pub fn merge(&mut self, other: &ComponentMask) {
        for (mine, theirs) in self.words.iter_mut().zip(other.words.iter()) {
            *mine |= *theirs;
        }
    }

    /// Iterates over the component ids of all set bits, ascending.
    pub fn bits(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            let base = word_index * 64;
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some((base + tz) as ComponentId)
            })
        })
    }
}

//! Open-addressed robin-hood hash table keyed by entity id.
//!
//! [`EntityMap`] maps entity ids to small payloads: storage handles, component
//! masks, or whole components (the sparse storage is a thin wrapper around
//! it). It is tuned for the engine's access pattern (integer keys from a
//! monotonic allocator, lookups on the hot path of every system) rather than
//! for generality.
//!
//! ## Design
//!
//! - Capacity is always a power of two; the slot for an id is selected by
//!   multiplying with an odd constant and masking with `capacity - 1`.
//! - Robin-hood insertion keeps the variance of probe distances low by
//!   letting an insertee displace any resident entry that sits closer to its
//!   initial slot than the insertee currently is.
//! - Removal tombstones the slot; tombstones are reused by insertion and
//!   discarded wholesale on rehash.
//! - The longest probe distance ever produced bounds every lookup.
//!
//! ## Invariants
//!
//! - `len() <= capacity() * 0.5` after any insert.
//! - Every present key is reachable within `longest_probe()` steps of its
//!   initial slot; tombstones never make a key unreachable before a rehash.
//! - Keys `0` (empty) and `1` (tombstone) are reserved and rejected.

use std::mem::MaybeUninit;
use std::ops::{Index, IndexMut};

use crate::engine::types::{EntityId, EMPTY_KEY, TOMBSTONE_KEY};

/// Capacity used by [`EntityMap::new`].
pub const DEFAULT_MAP_CAPACITY: usize = 64;

/// Occupancy threshold that triggers a doubling rehash.
pub const MAX_LOAD_FACTOR: f64 = 0.5;

const HASH_MULTIPLIER: u32 = 0x9E37_79B9;

#[inline]
const fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

#[inline]
fn hash_id(id: EntityId) -> usize {
    id.wrapping_mul(HASH_MULTIPLIER) as usize
}

/// Robin-hood hash map from [`EntityId`] to `V`.
pub struct EntityMap<V> {
    keys: Box<[EntityId]>,
    values: Box<[MaybeUninit<V>]>,
    count: usize,
    longest_probe: usize,
}

impl<V> EntityMap<V> {
    /// Creates a map with the given slot capacity.
    ///
    /// `capacity` must be a non-zero power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            is_power_of_two(capacity),
            "EntityMap capacity must be a power of two, got {capacity}"
        );
        let keys = vec![EMPTY_KEY; capacity].into_boxed_slice();
        let mut values = Vec::with_capacity(capacity);
        values.resize_with(capacity, MaybeUninit::uninit);
        Self {
            keys,
            values: values.into_boxed_slice(),
            count: 0,
            longest_probe: 0,
        }
    }

    /// Creates a map with [`DEFAULT_MAP_CAPACITY`] slots.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAP_CAPACITY)
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if the map holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Current slot capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    /// Longest probe distance any entry has required so far.
    #[inline]
    pub fn longest_probe(&self) -> usize {
        self.longest_probe
    }

    /// Fraction of slots occupied by live entries.
    #[inline]
    pub fn load_factor(&self) -> f64 {
        self.count as f64 / self.capacity() as f64
    }

    /// Initial probe slot for `id` at the current capacity.
    #[inline]
    pub fn initial_slot(&self, id: EntityId) -> usize {
        hash_id(id) & (self.capacity() - 1)
    }

    /// Key stored at slot `index`, if the slot holds a live entry.
    ///
    /// Diagnostic accessor; slot order is an implementation detail.
    pub fn slot_key(&self, index: usize) -> Option<EntityId> {
        let key = self.keys[index];
        if key == EMPTY_KEY || key == TOMBSTONE_KEY {
            None
        } else {
            Some(key)
        }
    }

    fn find_slot(&self, id: EntityId) -> Option<usize> {
        if id == EMPTY_KEY || id == TOMBSTONE_KEY {
            return None;
        }
        let mask = self.capacity() - 1;
        let mut index = hash_id(id) & mask;
        let mut probed = 0usize;
        loop {
            let key = self.keys[index];
            if key == id {
                return Some(index);
            }
            if key == EMPTY_KEY {
                return None;
            }
            index = (index + 1) & mask;
            probed += 1;
            if probed > self.longest_probe {
                return None;
            }
        }
    }

    /// Returns a reference to the value for `id`, if present.
    pub fn lookup(&self, id: EntityId) -> Option<&V> {
        let slot = self.find_slot(id)?;
        Some(unsafe { self.values[slot].assume_init_ref() })
    }

    /// Returns a mutable reference to the value for `id`, if present.
    pub fn lookup_mut(&mut self, id: EntityId) -> Option<&mut V> {
        let slot = self.find_slot(id)?;
        Some(unsafe { self.values[slot].assume_init_mut() })
    }

    /// Returns `true` if `id` has an entry.
    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.find_slot(id).is_some()
    }

    /// Inserts `value` for `id`, overwriting any existing value in place.
    ///
    /// Rehashes to double capacity first whenever the insertion would push
    /// the load factor past [`MAX_LOAD_FACTOR`]. Insertion over a tombstone
    /// reuses the slot.
    pub fn insert(&mut self, id: EntityId, value: V) -> &mut V {
        assert!(
            id != EMPTY_KEY && id != TOMBSTONE_KEY,
            "EntityMap: attempted to insert reserved key {id}"
        );

        // Resolve an existing entry first; displacement must only run for
        // absent keys, or a tombstone ahead of the key's slot would yield a
        // duplicate.
        if let Some(slot) = self.find_slot(id) {
            let stored = unsafe { self.values[slot].assume_init_mut() };
            *stored = value;
            return stored;
        }

        if (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD_FACTOR {
            self.rehash(self.capacity() * 2);
        }

        let mask = self.capacity() - 1;
        let mut index = hash_id(id) & mask;
        let mut distance = 0usize;
        let mut carried_key = id;
        let mut carried_value = MaybeUninit::new(value);
        let mut placed: Option<usize> = None;

        loop {
            let resident = self.keys[index];
            if resident == EMPTY_KEY || resident == TOMBSTONE_KEY {
                self.keys[index] = carried_key;
                self.values[index] = carried_value;
                self.count += 1;
                self.longest_probe = self.longest_probe.max(distance);
                let slot = placed.unwrap_or(index);
                return unsafe { self.values[slot].assume_init_mut() };
            }

            let resident_distance = index.wrapping_sub(hash_id(resident)) & mask;
            if resident_distance < distance {
                std::mem::swap(&mut self.keys[index], &mut carried_key);
                std::mem::swap(&mut self.values[index], &mut carried_value);
                self.longest_probe = self.longest_probe.max(distance);
                if placed.is_none() {
                    placed = Some(index);
                }
                distance = resident_distance;
            }

            index = (index + 1) & mask;
            distance += 1;
        }
    }

    /// Removes the entry for `id`; returns `true` if one was present.
    pub fn remove(&mut self, id: EntityId) -> bool {
        match self.find_slot(id) {
            Some(slot) => {
                self.keys[slot] = TOMBSTONE_KEY;
                unsafe { self.values[slot].assume_init_drop() };
                self.count -= 1;
                true
            }
            None => false,
        }
    }

    /// Re-inserts every live entry into a fresh table of `new_capacity`
    /// slots, discarding tombstones.
    ///
    /// `new_capacity` must be a power of two strictly greater than the
    /// current capacity.
    pub fn rehash(&mut self, new_capacity: usize) {
        assert!(
            new_capacity > self.capacity(),
            "EntityMap: rehash must grow the table ({} -> {new_capacity})",
            self.capacity()
        );
        assert!(
            is_power_of_two(new_capacity),
            "EntityMap capacity must be a power of two, got {new_capacity}"
        );

        let mut fresh = Self::with_capacity(new_capacity);
        for slot in 0..self.capacity() {
            let key = self.keys[slot];
            if key != EMPTY_KEY && key != TOMBSTONE_KEY {
                self.keys[slot] = EMPTY_KEY;
                let value = unsafe { self.values[slot].assume_init_read() };
                fresh.insert(key, value);
            }
        }
        self.count = 0;
        std::mem::swap(self, &mut fresh);
    }

    /// Iterates over all live `(id, value)` entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &V)> + '_ {
        self.keys
            .iter()
            .zip(self.values.iter())
            .filter(|(&key, _)| key != EMPTY_KEY && key != TOMBSTONE_KEY)
            .map(|(&key, value)| (key, unsafe { value.assume_init_ref() }))
    }
}

impl<V> Index<EntityId> for EntityMap<V> {
    type Output = V;

    fn index(&self, id: EntityId) -> &V {
        self.lookup(id)
            .unwrap_or_else(|| panic!("EntityMap: no entry for entity {id}"))
    }
}

impl<V> IndexMut<EntityId> for EntityMap<V> {
    fn index_mut(&mut self, id: EntityId) -> &mut V {
        self.lookup_mut(id)
            .unwrap_or_else(|| panic!("EntityMap: no entry for entity {id}"))
    }
}

impl<V> Default for EntityMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Drop for EntityMap<V> {
    fn drop(&mut self) {
        if std::mem::needs_drop::<V>() {
            for slot in 0..self.keys.len() {
                let key = self.keys[slot];
                if key != EMPTY_KEY && key != TOMBSTONE_KEY {
                    unsafe { self.values[slot].assume_init_drop() };
                }
            }
        }
    }
}

//! Bucketed dense component storage with stable handles.
//!
//! [`BucketStorage`] keeps component values in a list of fixed-size buckets,
//! each pairing an uninitialized value array with a parallel slot-to-entity
//! table. An [`EntityMap`] maps each entity to the `(bucket, slot)` handle
//! holding its value, so handles stay valid across attaches and detaches of
//! other entities.
//!
//! Built for large populations that are iterated densely and rarely
//! detached. Detaching punches holes; an explicit [`defragment`] pass
//! co-sorts slot contents by entity id to restore iteration locality.
//! Defragmentation is never triggered automatically; callers consult
//! [`estimate_defrag_seconds`] and decide.
//!
//! [`defragment`]: BucketStorage::defragment
//! [`estimate_defrag_seconds`]: BucketStorage::estimate_defrag_seconds

use std::any::Any;
use std::mem::MaybeUninit;

use tracing::debug;

use crate::engine::entity_map::EntityMap;
use crate::engine::storage::{ComponentStorage, ErasedStorage};
use crate::engine::types::{EntityId, NO_ENTITY, NO_OPEN_SLOT};

/// Fragmentation ratio below which defragmentation is not worth estimating.
const DEFRAG_THRESHOLD: f64 = 0.1;

/// Locator of a component value inside a [`BucketStorage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handle {
    /// Index of the bucket.
    pub bucket: u16,
    /// Slot within the bucket.
    pub slot: u16,
}

struct Bucket<C> {
    values: Box<[MaybeUninit<C>]>,
    slot_ids: Box<[EntityId]>,
    active: usize,
    next_open_slot: u16,
}

impl<C> Bucket<C> {
    fn new(len: usize) -> Self {
        let mut values = Vec::with_capacity(len);
        values.resize_with(len, MaybeUninit::uninit);
        Self {
            values: values.into_boxed_slice(),
            slot_ids: vec![NO_ENTITY; len].into_boxed_slice(),
            active: 0,
            next_open_slot: 0,
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.slot_ids.len()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.active == self.len()
    }

    fn value(&self, slot: u16) -> &C {
        assert!(
            self.slot_ids[slot as usize] != NO_ENTITY,
            "bucket slot {slot} is not occupied"
        );
        unsafe { self.values[slot as usize].assume_init_ref() }
    }

    fn value_mut(&mut self, slot: u16) -> &mut C {
        assert!(
            self.slot_ids[slot as usize] != NO_ENTITY,
            "bucket slot {slot} is not occupied"
        );
        unsafe { self.values[slot as usize].assume_init_mut() }
    }

    fn insert(&mut self, id: EntityId, value: C) -> u16 {
        assert!(!self.is_full(), "insert into a full bucket");
        let slot = self.next_open_slot;
        debug_assert_eq!(self.slot_ids[slot as usize], NO_ENTITY);
        self.values[slot as usize].write(value);
        self.slot_ids[slot as usize] = id;
        self.active += 1;

        self.next_open_slot = NO_OPEN_SLOT;
        for candidate in (slot as usize + 1)..self.len() {
            if self.slot_ids[candidate] == NO_ENTITY {
                self.next_open_slot = candidate as u16;
                break;
            }
        }
        slot
    }

    fn release(&mut self, slot: u16) {
        assert!(self.active > 0, "release from an empty bucket");
        assert!(
            self.slot_ids[slot as usize] != NO_ENTITY,
            "release of an unoccupied bucket slot {slot}"
        );
        unsafe { self.values[slot as usize].assume_init_drop() };
        self.slot_ids[slot as usize] = NO_ENTITY;
        self.active -= 1;

        // Keep the hint pointing at the earliest empty slot.
        if self.next_open_slot == NO_OPEN_SLOT || slot < self.next_open_slot {
            self.next_open_slot = slot;
        }
    }

    fn recompute_occupancy(&mut self) {
        self.active = 0;
        self.next_open_slot = NO_OPEN_SLOT;
        for slot in 0..self.len() {
            if self.slot_ids[slot] != NO_ENTITY {
                self.active += 1;
            } else if self.next_open_slot == NO_OPEN_SLOT {
                self.next_open_slot = slot as u16;
            }
        }
    }
}

impl<C> Drop for Bucket<C> {
    fn drop(&mut self) {
        if std::mem::needs_drop::<C>() {
            for slot in 0..self.len() {
                if self.slot_ids[slot] != NO_ENTITY {
                    unsafe { self.values[slot].assume_init_drop() };
                }
            }
        }
    }
}

// The buffer is nearly sorted between maintenance passes, which is the case
// insertion sort is linear for.
fn insertion_sort(ids: &mut [EntityId]) {
    for i in 1..ids.len() {
        let key = ids[i];
        let mut j = i;
        while j > 0 && ids[j - 1] > key {
            ids[j] = ids[j - 1];
            j -= 1;
        }
        ids[j] = key;
    }
}

fn bucket_pair_mut<C>(
    buckets: &mut [Bucket<C>],
    first: usize,
    second: usize,
) -> (&mut Bucket<C>, &mut Bucket<C>) {
    debug_assert_ne!(first, second);
    if first < second {
        let (head, tail) = buckets.split_at_mut(second);
        (&mut head[first], &mut tail[0])
    } else {
        let (head, tail) = buckets.split_at_mut(first);
        (&mut tail[0], &mut head[second])
    }
}

/// Bucketed dense storage for component `C` with buckets of `N` slots.
///
/// `N` is a per-component choice made at definition time and must be below
/// `65535` (slot indices are `u16`).
pub struct BucketStorage<C, const N: usize> {
    buckets: Vec<Bucket<C>>,
    handles: EntityMap<Handle>,
    sort_scratch: Vec<EntityId>,
    removals_since_defrag: usize,
}

impl<C, const N: usize> BucketStorage<C, N> {
    /// Creates an empty storage.
    pub fn new() -> Self {
        const {
            assert!(N > 0 && N < 65535, "bucket size must be in 1..65535");
        }
        Self {
            buckets: Vec::new(),
            handles: EntityMap::new(),
            sort_scratch: Vec::new(),
            removals_since_defrag: 0,
        }
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if no value is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of allocated buckets.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Slot-to-entity table of bucket `bucket`; empty slots hold
    /// [`NO_ENTITY`](crate::engine::types::NO_ENTITY).
    pub fn slot_entities(&self, bucket: usize) -> &[EntityId] {
        &self.buckets[bucket].slot_ids
    }

    /// Number of occupied slots in bucket `bucket`.
    pub fn active_slots(&self, bucket: usize) -> usize {
        self.buckets[bucket].active
    }

    /// Current handle of `id`, if it has a value.
    pub fn handle(&self, id: EntityId) -> Option<Handle> {
        self.handles.lookup(id).copied()
    }

    /// Detaches recorded since the last defragmentation.
    #[inline]
    pub fn removals_since_defrag(&self) -> usize {
        self.removals_since_defrag
    }

    /// Returns `true` if `id` has a value.
    #[inline]
    pub fn has(&self, id: EntityId) -> bool {
        self.handles.contains(id)
    }

    /// Returns the value for `id`. Fatal if absent.
    pub fn get(&self, id: EntityId) -> &C {
        let handle = self.handles[id];
        self.buckets[handle.bucket as usize].value(handle.slot)
    }

    /// Returns the value for `id` mutably. Fatal if absent.
    pub fn get_mut(&mut self, id: EntityId) -> &mut C {
        let handle = self.handles[id];
        self.buckets[handle.bucket as usize].value_mut(handle.slot)
    }

    /// Returns the value for `id`, if present.
    pub fn get_if(&self, id: EntityId) -> Option<&C> {
        let handle = *self.handles.lookup(id)?;
        Some(self.buckets[handle.bucket as usize].value(handle.slot))
    }

    /// Returns the value for `id` mutably, if present.
    pub fn get_if_mut(&mut self, id: EntityId) -> Option<&mut C> {
        let handle = *self.handles.lookup(id)?;
        Some(self.buckets[handle.bucket as usize].value_mut(handle.slot))
    }

    /// Stores `value` for `id` in the first bucket with an open slot,
    /// allocating a new bucket if every one is full. Fatal if `id` already
    /// has a value.
    pub fn attach(&mut self, id: EntityId, value: C) -> &mut C {
        assert!(
            !self.has(id),
            "attach: entity {id} already has component {}",
            std::any::type_name::<C>()
        );

        let bucket_index = match self.buckets.iter().position(|bucket| !bucket.is_full()) {
            Some(index) => index,
            None => {
                assert!(
                    self.buckets.len() < u16::MAX as usize,
                    "bucket index space exhausted"
                );
                self.buckets.push(Bucket::new(N));
                self.buckets.len() - 1
            }
        };

        let slot = self.buckets[bucket_index].insert(id, value);
        self.handles.insert(
            id,
            Handle {
                bucket: bucket_index as u16,
                slot,
            },
        );
        self.buckets[bucket_index].value_mut(slot)
    }

    /// Destroys the value for `id` and marks its slot open. Fatal if absent.
    pub fn detach(&mut self, id: EntityId) {
        let handle = *self.handles.lookup(id).unwrap_or_else(|| {
            panic!(
                "detach: entity {id} has no component {}",
                std::any::type_name::<C>()
            )
        });
        self.buckets[handle.bucket as usize].release(handle.slot);
        self.handles.remove(id);
        self.removals_since_defrag += 1;
    }

    /// Re-orders slot contents so entities appear in id-ascending order
    /// across `(bucket 0, slot 0) .. (bucket B-1, slot N-1)`, with empty
    /// slots compacted toward the end.
    ///
    /// O(buckets · N) plus the sort. Takes `&mut self`: the pass is a single
    /// atomic operation from the world's perspective.
    pub fn defragment(&mut self) {
        let bucket_count = self.buckets.len();
        let total_slots = bucket_count * N;

        self.sort_scratch.clear();
        self.sort_scratch.reserve(total_slots);
        for bucket in &self.buckets {
            self.sort_scratch.extend_from_slice(&bucket.slot_ids);
        }
        insertion_sort(&mut self.sort_scratch);

        for position in 0..total_slots {
            let target = self.sort_scratch[position];
            let bucket_index = position / N;
            let slot = (position % N) as u16;
            let current = self.buckets[bucket_index].slot_ids[slot as usize];
            if current == target {
                continue;
            }

            // Every entity smaller than `target` already sits at an earlier
            // position, so `target` is real and lives at a later slot.
            debug_assert_ne!(target, NO_ENTITY);
            let source = self.handles[target];

            if source.bucket as usize == bucket_index {
                let bucket = &mut self.buckets[bucket_index];
                bucket.slot_ids.swap(slot as usize, source.slot as usize);
                bucket.values.swap(slot as usize, source.slot as usize);
            } else {
                let (destination, origin) =
                    bucket_pair_mut(&mut self.buckets, bucket_index, source.bucket as usize);
                std::mem::swap(
                    &mut destination.slot_ids[slot as usize],
                    &mut origin.slot_ids[source.slot as usize],
                );
                std::mem::swap(
                    &mut destination.values[slot as usize],
                    &mut origin.values[source.slot as usize],
                );
            }

            self.handles.insert(
                target,
                Handle {
                    bucket: bucket_index as u16,
                    slot,
                },
            );
            if current != NO_ENTITY {
                self.handles.insert(current, source);
            }
        }

        for bucket in &mut self.buckets {
            bucket.recompute_occupancy();
        }

        debug!(
            component = std::any::type_name::<C>(),
            buckets = bucket_count,
            removals = self.removals_since_defrag,
            "defragmented bucket storage"
        );
        self.removals_since_defrag = 0;
    }

    /// Estimated wall-clock cost of [`defragment`](Self::defragment) in
    /// seconds, or `None` while the fragmentation ratio (removals since the
    /// last pass over total slots) is at or below 10%.
    ///
    /// The constants are empirical; callers decide whether to spend the time.
    pub fn estimate_defrag_seconds(&self) -> Option<f64> {
        let total_slots = self.buckets.len() * N;
        if total_slots == 0 {
            return None;
        }
        let fragmentation = self.removals_since_defrag as f64 / total_slots as f64;
        if fragmentation <= DEFRAG_THRESHOLD {
            return None;
        }
        Some((N as f64).ln() * (3.5e-4 + 3.4e-9 * self.removals_since_defrag as f64))
    }
}

impl<C, const N: usize> Default for BucketStorage<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + Sync + 'static, const N: usize> ComponentStorage<C> for BucketStorage<C, N> {
    fn has(&self, id: EntityId) -> bool {
        BucketStorage::has(self, id)
    }

    fn get(&self, id: EntityId) -> &C {
        BucketStorage::get(self, id)
    }

    fn get_mut(&mut self, id: EntityId) -> &mut C {
        BucketStorage::get_mut(self, id)
    }

    fn get_if(&self, id: EntityId) -> Option<&C> {
        BucketStorage::get_if(self, id)
    }

    fn get_if_mut(&mut self, id: EntityId) -> Option<&mut C> {
        BucketStorage::get_if_mut(self, id)
    }

    fn attach(&mut self, id: EntityId, value: C) -> &mut C {
        BucketStorage::attach(self, id, value)
    }

    fn detach(&mut self, id: EntityId) {
        BucketStorage::detach(self, id)
    }

    fn len(&self) -> usize {
        BucketStorage::len(self)
    }
}

impl<C: Send + Sync + 'static, const N: usize> ErasedStorage for BucketStorage<C, N> {
    fn has(&self, id: EntityId) -> bool {
        BucketStorage::has(self, id)
    }

    fn detach(&mut self, id: EntityId) {
        BucketStorage::detach(self, id)
    }

    fn attach_boxed(&mut self, id: EntityId, value: Box<dyn Any + Send>) {
        let value = value.downcast::<C>().unwrap_or_else(|_| {
            panic!(
                "component value type mismatch for {}",
                std::any::type_name::<C>()
            )
        });
        BucketStorage::attach(self, id, *value);
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

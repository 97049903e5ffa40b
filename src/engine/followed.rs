//! Sorted followed-entity sets and the per-system iteration view.
//!
//! Every registered system owns a [`FollowedSet`]: the sorted array of
//! entities whose component masks satisfy the system's subscription. The
//! drains maintain the sets with three bulk operations matched to the three
//! structural events:
//!
//! - creation → [`append_newest`] (fresh ids exceed every present id),
//! - attach → [`merge_insert`] (sorted union with dedup),
//! - detach/destruction → [`difference_remove`] (in-place set difference).
//!
//! During execution a system sees its set through [`FollowedEntities`], a
//! read-only view offering sequential and work-split parallel iteration.
//!
//! [`append_newest`]: FollowedSet::append_newest
//! [`merge_insert`]: FollowedSet::merge_insert
//! [`difference_remove`]: FollowedSet::difference_remove

use rayon::prelude::*;

use crate::engine::types::EntityId;

/// Sorted, duplicate-free set of entity ids backed by a contiguous array.
#[derive(Default)]
pub struct FollowedSet {
    entities: Vec<EntityId>,
}

impl FollowedSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of followed entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity is followed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Reserves capacity for `additional` more entities.
    pub fn reserve(&mut self, additional: usize) {
        self.entities.reserve(additional);
    }

    /// The ids as a sorted slice.
    #[inline]
    pub fn as_slice(&self) -> &[EntityId] {
        &self.entities
    }

    /// Iterates over the ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }

    /// Returns `true` if `id` is followed. Binary search.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.binary_search(&id).is_ok()
    }

    /// Appends `ids`, all of which must be sorted and strictly greater than
    /// every present element. Bulk copy.
    pub fn append_newest(&mut self, ids: &[EntityId]) {
        debug_assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        debug_assert!(match (self.entities.last(), ids.first()) {
            (Some(last), Some(first)) => last < first,
            _ => true,
        });
        self.entities.extend_from_slice(ids);
    }

    /// Merges sorted `ids` into the set, deduplicating. Stable two-range
    /// merge written from the back, O(len + ids.len()).
    pub fn merge_insert(&mut self, ids: &[EntityId]) {
        debug_assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        if ids.is_empty() {
            return;
        }

        let old_len = self.entities.len();
        self.entities.resize(old_len + ids.len(), 0);

        let mut read = old_len;
        let mut tail = ids.len();
        let mut write = self.entities.len();
        while tail > 0 {
            if read > 0 && self.entities[read - 1] > ids[tail - 1] {
                self.entities[write - 1] = self.entities[read - 1];
                read -= 1;
            } else {
                self.entities[write - 1] = ids[tail - 1];
                tail -= 1;
            }
            write -= 1;
        }

        self.entities.dedup();
    }

    /// Removes every id of sorted `ids` present in the set. Single linear
    /// pass with two read cursors and a write cursor.
    pub fn difference_remove(&mut self, ids: &[EntityId]) {
        debug_assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        if ids.is_empty() || self.entities.is_empty() {
            return;
        }

        // Elements below the first removal candidate are untouched.
        let mut write = match self.entities.binary_search(&ids[0]) {
            Ok(index) => index,
            Err(index) => index,
        };
        if write == self.entities.len() {
            return;
        }

        let mut read = write;
        let mut removal = 0usize;
        while read < self.entities.len() && removal < ids.len() {
            let current = self.entities[read];
            if current < ids[removal] {
                self.entities[write] = current;
                write += 1;
                read += 1;
            } else if ids[removal] < current {
                removal += 1;
            } else {
                read += 1;
                removal += 1;
            }
        }
        while read < self.entities.len() {
            self.entities[write] = self.entities[read];
            write += 1;
            read += 1;
        }
        self.entities.truncate(write);
    }

    /// Divides the set into `n` contiguous sub-ranges covering it exactly
    /// once in order; the first `len % n` ranges hold one extra element.
    pub fn split(&self, n: usize) -> Vec<&[EntityId]> {
        assert!(n > 0, "split requires at least one range");
        let base = self.entities.len() / n;
        let extra = self.entities.len() % n;
        let mut ranges = Vec::with_capacity(n);
        let mut start = 0;
        for index in 0..n {
            let len = base + usize::from(index < extra);
            ranges.push(&self.entities[start..start + len]);
            start += len;
        }
        ranges
    }
}

/// Read-only view of a system's followed set, handed to `run`.
///
/// Iteration yields ids in ascending order. [`for_each_par`] applies the
/// closure to every id exactly once, splitting the set into one contiguous
/// range per pool worker; invocations may interleave across threads in any
/// order.
///
/// [`for_each_par`]: FollowedEntities::for_each_par
pub struct FollowedEntities<'w> {
    set: &'w FollowedSet,
    pool: &'w rayon::ThreadPool,
}

impl<'w> FollowedEntities<'w> {
    pub(crate) fn new(set: &'w FollowedSet, pool: &'w rayon::ThreadPool) -> Self {
        Self { set, pool }
    }

    /// Number of followed entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Returns `true` if no entity is followed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Returns `true` if `id` is followed.
    pub fn contains(&self, id: EntityId) -> bool {
        self.set.contains(id)
    }

    /// Iterates over the ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.set.iter()
    }

    /// Applies `f` to every followed id, in order, on the calling thread.
    pub fn for_each(&self, mut f: impl FnMut(EntityId)) {
        for id in self.set.iter() {
            f(id);
        }
    }

    /// Applies `f` to every followed id exactly once across the worker
    /// pool. Blocks until all sub-ranges complete.
    pub fn for_each_par(&self, f: impl Fn(EntityId) + Send + Sync) {
        let workers = self.pool.current_num_threads().max(1);
        let ranges = self.set.split(workers);
        self.pool.install(|| {
            ranges.into_par_iter().for_each(|range| {
                for &id in range {
                    f(id);
                }
            });
        });
    }
}

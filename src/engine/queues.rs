//! Per-tick structural-change queues.
//!
//! Systems never mutate the follow index or the entity mask table directly;
//! they enqueue structural effects here, and the post-processor drains the
//! queues between system invocations:
//!
//! - pending creations (id, accumulated mask, and the boxed component
//!   values the creation drain will route into storages),
//! - the death row of entities marked for destruction,
//! - per-component attach and detach lists.
//!
//! Each queue is written by at most one system per parallel group (the
//! dispatcher refuses groups that would share one), so the cells need a
//! taken-flag rather than a lock; a second simultaneous grab is a programmer
//! error and fatal.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::component::Bundle;
use crate::engine::types::{ComponentMask, EntityId};

/// An entity built this structural window, not yet drained.
pub(crate) struct PendingEntity {
    pub id: EntityId,
    pub mask: ComponentMask,
    pub bundle: Bundle,
}

/// Single-owner cell around one structural queue.
pub(crate) struct QueueCell<T> {
    taken: AtomicBool,
    inner: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for QueueCell<T> {}

impl<T> QueueCell<T> {
    pub(crate) fn new(inner: T) -> Self {
        Self {
            taken: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    /// Direct access with exclusive access to the world (drains).
    pub(crate) fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Claims the queue for one capability handle. Fatal if already claimed.
    #[allow(clippy::mut_from_ref)]
    pub(crate) fn claim(&self, what: &str) -> (&mut T, QueueRelease<'_>) {
        let was_taken = self.taken.swap(true, Ordering::AcqRel);
        assert!(!was_taken, "{what} is already claimed by another handle");
        let inner = unsafe { &mut *self.inner.get() };
        (inner, QueueRelease { taken: &self.taken })
    }
}

/// RAII release of a claimed queue.
pub(crate) struct QueueRelease<'a> {
    taken: &'a AtomicBool,
}

impl Drop for QueueRelease<'_> {
    fn drop(&mut self) {
        self.taken.store(false, Ordering::Release);
    }
}

/// All structural queues of one world.
pub(crate) struct StructuralQueues {
    pub new_entities: QueueCell<Vec<PendingEntity>>,
    pub death_row: QueueCell<Vec<EntityId>>,
    pub attached: Vec<QueueCell<Vec<EntityId>>>,
    pub detached: Vec<QueueCell<Vec<EntityId>>>,
}

impl StructuralQueues {
    pub(crate) fn new(component_count: usize) -> Self {
        let mut attached = Vec::with_capacity(component_count);
        attached.resize_with(component_count, || QueueCell::new(Vec::new()));
        let mut detached = Vec::with_capacity(component_count);
        detached.resize_with(component_count, || QueueCell::new(Vec::new()));
        Self {
            new_entities: QueueCell::new(Vec::new()),
            death_row: QueueCell::new(Vec::new()),
            attached,
            detached,
        }
    }
}

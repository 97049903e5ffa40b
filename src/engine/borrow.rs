//! Runtime read/write borrow flags for components and resources.
//!
//! Capability handles enforce Rust-like borrowing rules at runtime across
//! dynamically dispatched systems: any number of concurrent readers per
//! component, at most one writer, never both. Each component (and each
//! resource) maps to one atomic state word:
//!
//! | state | meaning |
//! |------:|---------|
//! | `0` | unborrowed |
//! | `usize::MAX` | write-borrowed |
//! | `n >= 1` | `n` active readers |
//!
//! A conflicting acquisition is always a programmer error (the parallel
//! dispatcher already refuses groups with conflicting declarations), so it
//! aborts with a diagnostic rather than waiting for release.
//!
//! [`BorrowRelease`] pairs every acquisition with an RAII release for the
//! lifetime of the owning handle.

use std::sync::atomic::{AtomicUsize, Ordering};

const WRITE_LOCKED: usize = usize::MAX;

/// One atomic borrow state per tracked slot.
pub(crate) struct BorrowFlags {
    states: Box<[AtomicUsize]>,
}

impl BorrowFlags {
    pub(crate) fn new(count: usize) -> Self {
        let mut states = Vec::with_capacity(count);
        states.resize_with(count, || AtomicUsize::new(0));
        Self {
            states: states.into_boxed_slice(),
        }
    }

    /// Acquires a shared borrow of slot `index`. Fatal if write-borrowed.
    pub(crate) fn acquire_read(&self, index: usize, what: &str) {
        let state = &self.states[index];
        let mut current = state.load(Ordering::Acquire);
        loop {
            assert!(
                current != WRITE_LOCKED,
                "{what} is already exclusively borrowed"
            );
            match state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Releases a shared borrow of slot `index`.
    pub(crate) fn release_read(&self, index: usize) {
        let previous = self.states[index].fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous >= 1 && previous != WRITE_LOCKED);
    }

    /// Acquires the exclusive borrow of slot `index`. Fatal if borrowed at
    /// all.
    pub(crate) fn acquire_write(&self, index: usize, what: &str) {
        let result = self.states[index].compare_exchange(
            0,
            WRITE_LOCKED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        assert!(result.is_ok(), "{what} is already borrowed");
    }

    /// Releases the exclusive borrow of slot `index`.
    pub(crate) fn release_write(&self, index: usize) {
        let previous = self.states[index].swap(0, Ordering::AcqRel);
        debug_assert_eq!(previous, WRITE_LOCKED);
    }
}

#[derive(Clone, Copy)]
enum BorrowMode {
    Read,
    Write,
}

/// RAII release of one acquired borrow.
pub(crate) struct BorrowRelease<'a> {
    flags: &'a BorrowFlags,
    index: usize,
    mode: BorrowMode,
}

impl<'a> BorrowRelease<'a> {
    pub(crate) fn read(flags: &'a BorrowFlags, index: usize, what: &str) -> Self {
        flags.acquire_read(index, what);
        Self {
            flags,
            index,
            mode: BorrowMode::Read,
        }
    }

    pub(crate) fn write(flags: &'a BorrowFlags, index: usize, what: &str) -> Self {
        flags.acquire_write(index, what);
        Self {
            flags,
            index,
            mode: BorrowMode::Write,
        }
    }
}

impl Drop for BorrowRelease<'_> {
    fn drop(&mut self) {
        match self.mode {
            BorrowMode::Read => self.flags.release_read(self.index),
            BorrowMode::Write => self.flags.release_write(self.index),
        }
    }
}

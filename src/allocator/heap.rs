//! Heap — a collection of size-classed superblock buckets with allocate/
//! free/release/acquire (C2).
//!
//! Grounded on `mtallocator.cpp`'s `Heap` inner class: one lock (here a
//! `parking_lot::Mutex`, the teacher's lock of choice throughout
//! `allocator/pool.rs` and `allocator/stack.rs`) guarding a per-class vector
//! of intrusive superblock lists plus `allocated`/`used` byte counters. The
//! "first non-full superblock wins" scan is unchanged from the source in
//! both `allocate` and the two `release_superblock` overloads.

use parking_lot::{Mutex, MutexGuard};

use super::superblock::Superblock;

/// One heap: the global heap (index 0) or one of the `M` local heaps.
///
/// The heap's single mutex covers its bucket lists, its `allocated`/`used`
/// counters, and the `prev`/`next` list pointers of every superblock it
/// currently owns (SPEC_FULL.md §5). The `owner` field on each superblock
/// is the one piece of state readable without this lock — see
/// `Superblock::owner`.
pub(crate) struct Heap {
    state: Mutex<HeapState>,
}

struct HeapState {
    /// One intrusive list head per size class, indexed by `class_log2`.
    buckets: Vec<*mut Superblock>,
    allocated: usize,
    used: usize,
}

// SAFETY: every `*mut Superblock` reachable from a `HeapState` is exclusively
// owned by whichever heap's lock currently guards it; the heap lock is the
// synchronization that makes sharing `Heap` across threads sound.
unsafe impl Send for HeapState {}

impl Heap {
    /// `num_classes` must be large enough to index every `class_log2` this
    /// allocator will ever construct a superblock for (`sb_size.trailing_zeros() + 1`
    /// covers all of them with room to spare).
    pub(crate) fn new(num_classes: usize) -> Self {
        Self {
            state: Mutex::new(HeapState {
                buckets: vec![std::ptr::null_mut(); num_classes],
                allocated: 0,
                used: 0,
            }),
        }
    }

    pub(crate) fn lock(&self) -> HeapGuard<'_> {
        HeapGuard { guard: self.state.lock() }
    }

    pub(crate) fn try_lock(&self) -> Option<HeapGuard<'_>> {
        self.state.try_lock().map(|guard| HeapGuard { guard })
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for &head in &state.buckets {
            let mut cur = head;
            while !cur.is_null() {
                // SAFETY: every superblock reachable from a bucket head is
                // owned by this heap and not referenced elsewhere once the
                // heap itself is being dropped.
                unsafe {
                    let next = (*cur).next;
                    Superblock::destroy(cur);
                    cur = next;
                }
            }
        }
    }
}

/// A held heap lock. Exists as its own type (rather than exposing the raw
/// `MutexGuard`) so `hoard.rs` can hold one across several operations —
/// exactly the pattern `Allocator::allocate`/`free` need for the
/// lock-ordering discipline in SPEC_FULL.md §5.
pub(crate) struct HeapGuard<'a> {
    guard: MutexGuard<'a, HeapState>,
}

impl<'a> HeapGuard<'a> {
    /// `Heap::Allocate(class_log2)`: first non-full superblock in the
    /// bucket serves the request.
    pub(crate) fn allocate(&mut self, class_log2: u32) -> Option<std::ptr::NonNull<u8>> {
        let state = &mut *self.guard;
        let head = state.buckets[class_log2 as usize];
        let mut cur = head;
        while !cur.is_null() {
            // SAFETY: `cur` is a live superblock owned by this heap.
            unsafe {
                if !(*cur).is_full() {
                    let block = (*cur).get_block();
                    state.used += (*cur).block_size();
                    return Some(block);
                }
                cur = (*cur).next;
            }
        }
        None
    }

    /// `Heap::Free(p, S)`. Precondition: `S.owner() == this heap` at the
    /// moment of the call (checked by the caller under the migration-race
    /// retry loop in `hoard::free`).
    pub(crate) fn free(&mut self, user_ptr: std::ptr::NonNull<u8>, sb: *mut Superblock) {
        // SAFETY: caller guarantees `sb` is owned by this heap and `user_ptr`
        // was handed out by it.
        unsafe {
            (*sb).free_block(user_ptr);
            self.guard.used -= (*sb).block_size();
        }
    }

    /// `Heap::ReleaseSuperblock(class_log2)`: unlinks the first non-full
    /// superblock in that class's bucket and returns it. Does not clear the
    /// superblock's owner — the caller installs it elsewhere.
    pub(crate) fn release_superblock_for_class(&mut self, class_log2: u32) -> Option<*mut Superblock> {
        let state = &mut *self.guard;
        let found = Self::find_non_full(state.buckets[class_log2 as usize]);
        found.map(|sb| self.unlink(class_log2 as usize, sb))
    }

    /// `Heap::ReleaseSuperblock()` (class-agnostic): scans every bucket for
    /// any non-full superblock.
    pub(crate) fn release_any_superblock(&mut self) -> Option<*mut Superblock> {
        let num_classes = self.guard.buckets.len();
        for class in 0..num_classes {
            if let Some(sb) = Self::find_non_full(self.guard.buckets[class]) {
                return Some(self.unlink(class, sb));
            }
        }
        None
    }

    fn find_non_full(head: *mut Superblock) -> Option<*mut Superblock> {
        let mut cur = head;
        while !cur.is_null() {
            // SAFETY: every reachable node in a bucket list is live.
            unsafe {
                if !(*cur).is_full() {
                    return Some(cur);
                }
                cur = (*cur).next;
            }
        }
        None
    }

    fn unlink(&mut self, class: usize, sb: *mut Superblock) -> *mut Superblock {
        let state = &mut *self.guard;
        // SAFETY: `sb` is a live superblock currently linked into `class`'s
        // bucket of this heap.
        unsafe {
            if (*sb).prev.is_null() {
                state.buckets[class] = (*sb).next;
            }
            Superblock::pop(sb);
            state.allocated -= (*sb).sb_size();
            state.used -= (*sb).used();
        }
        sb
    }

    /// `Heap::AcquireSuperblock(S)`: publishes `owner`, pushes `S` at the
    /// head of its class bucket, and folds its counters into this heap's.
    /// `owner` must be the address of the `Heap` this guard was locked
    /// from — the caller (hoard.rs) is in the best position to know that.
    pub(crate) fn acquire_superblock(&mut self, owner: *mut super::heap::Heap, sb: *mut Superblock) {
        let state = &mut *self.guard;
        // SAFETY: `sb` is either freshly constructed or was just unlinked
        // from another heap's bucket (never both owned and linked at once).
        unsafe {
            (*sb).set_owner(owner);
            let class = (*sb).class_log2() as usize;
            let head = state.buckets[class];
            if !head.is_null() {
                (*head).prev = sb;
            }
            (*sb).next = head;
            (*sb).prev = std::ptr::null_mut();
            state.buckets[class] = sb;

            state.allocated += (*sb).sb_size();
            state.used += (*sb).used();
        }
    }

    #[inline]
    pub(crate) fn allocated(&self) -> usize {
        self.guard.allocated
    }

    #[inline]
    pub(crate) fn used(&self) -> usize {
        self.guard.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::superblock::class_for_size;

    fn num_classes(sb_size: usize) -> usize {
        sb_size.trailing_zeros() as usize + 1
    }

    #[test]
    fn allocate_serves_from_first_non_full_superblock() {
        let sb_size = 1 << 15;
        let heap = Heap::new(num_classes(sb_size));
        let class = class_for_size(40);
        let raw = Superblock::new(class, sb_size);

        let mut guard = heap.lock();
        guard.acquire_superblock(&heap as *const Heap as *mut Heap, raw);
        let p = guard.allocate(class);
        assert!(p.is_some());
        assert_eq!(guard.used(), 1 << class);
        assert_eq!(guard.allocated(), sb_size);
    }

    #[test]
    fn release_and_reacquire_preserves_counters() {
        let sb_size = 1 << 15;
        let heap = Heap::new(num_classes(sb_size));
        let class = class_for_size(64);
        let raw = Superblock::new(class, sb_size);

        let mut guard = heap.lock();
        guard.acquire_superblock(&heap as *const Heap as *mut Heap, raw);
        let _p = guard.allocate(class);
        assert_eq!(guard.used(), 64);

        let released = guard.release_superblock_for_class(class).unwrap();
        assert_eq!(guard.used(), 0);
        assert_eq!(guard.allocated(), 0);

        guard.acquire_superblock(&heap as *const Heap as *mut Heap, released);
        assert_eq!(guard.used(), 64);
        assert_eq!(guard.allocated(), sb_size);
    }
}

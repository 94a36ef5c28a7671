//! Superblock — a fixed-size, size-classed memory chunk with an intrusive
//! free-list and a back-pointer header per block (C1).
//!
//! Grounded on `mtallocator.cpp`'s `SuperBlock` (kept for reference in
//! `examples/original_source/`, never shipped in this crate): same slot
//! layout (back-pointer immediately before every user block), same
//! `next_block`/`free_head` intrusive free list, same doubly-linked
//! `prev`/`next` bucket pointers. Ported to Rust ownership: the raw byte
//! buffer is allocated through `std::alloc::System` directly (the teacher's
//! own choice in `allocator/system.rs`) instead of C's `malloc`, and the
//! free-list index array widens from `unsigned short` to `u32` (see
//! DESIGN.md).

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

use super::heap::Heap;

/// Sentinel free-list index meaning "no more free blocks".
pub(crate) const SENTINEL: u32 = u32::MAX;

/// Every block in a superblock is prefixed by a pointer-sized back-pointer
/// to its owning superblock (NULL for large allocations, see
/// `hoard::allocate_large`). Small size classes are floored at this width so
/// that every slot — and therefore every user payload address — stays
/// pointer-aligned, matching the external contract in SPEC_FULL.md §6.
pub(crate) const BACK_PTR_SIZE: usize = std::mem::size_of::<*mut Superblock>();

/// Rounds `size` up to the smallest size class that can hold it.
///
/// `size == 0` is not special-cased: it rounds to the smallest class like
/// any other request (SPEC_FULL.md §4.3, resolved Open Question 2), giving
/// every `alloc(0)` call a real, distinct, freeable pointer.
pub(crate) fn class_for_size(size: usize) -> u32 {
    let rounded = size.max(1).next_power_of_two().max(BACK_PTR_SIZE);
    rounded.trailing_zeros()
}

/// `true` when `size` must bypass the size-classed path entirely (the
/// large-allocation passthrough), i.e. `2 * size > sb_size`. Uses checked
/// arithmetic so a pathologically large `size` is treated as "large"
/// instead of silently wrapping.
pub(crate) fn is_large(size: usize, sb_size: usize) -> bool {
    size.checked_mul(2).map_or(true, |doubled| doubled > sb_size)
}

/// A fixed-size (`sb_size`-byte) chunk subdivided into `n` blocks of one
/// size class, with an intrusive free-list and atomic owner.
///
/// Superblocks are heap-allocated individually (`Box::into_raw`) so their
/// address is stable for the lifetime of the back-pointers embedded in
/// every block they hand out; they live in raw intrusive lists owned by
/// whichever `Heap` currently holds them, so ordinary `Box` ownership
/// doesn't fit and this type is managed manually by `Heap`.
pub(crate) struct Superblock {
    class_log2: u32,
    block_size: usize,
    n: u32,
    sb_size: usize,
    used_bytes: usize,
    free_head: u32,
    next_block: Box<[u32]>,
    payload: NonNull<u8>,
    payload_layout: Layout,
    owner: AtomicPtr<Heap>,
    pub(crate) prev: *mut Superblock,
    pub(crate) next: *mut Superblock,
}

unsafe impl Send for Superblock {}

impl Superblock {
    /// Allocates a new superblock for `class_log2` and leaks it to a raw
    /// pointer — ownership transfers to whichever `Heap` calls
    /// `acquire_superblock` next.
    pub(crate) fn new(class_log2: u32, sb_size: usize) -> *mut Superblock {
        let block_size = 1usize << class_log2;
        debug_assert!(block_size >= BACK_PTR_SIZE, "size class below pointer-size floor");
        let n = (sb_size / block_size) as u32;
        debug_assert!(n > 0, "sb_size too small for this class");

        let slot_size = BACK_PTR_SIZE + block_size;
        let total = slot_size * n as usize;
        let payload_layout = Layout::from_size_align(total, BACK_PTR_SIZE)
            .expect("superblock payload layout never overflows for realistic SB sizes");

        // SAFETY: total > 0 because n > 0 and slot_size > 0.
        let raw = unsafe { alloc::alloc(payload_layout) };
        let payload = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(payload_layout));

        let mut next_block = vec![0u32; n as usize].into_boxed_slice();
        for i in 0..n {
            next_block[i as usize] = if i + 1 < n { i + 1 } else { SENTINEL };
        }

        let sb = Box::new(Superblock {
            class_log2,
            block_size,
            n,
            sb_size,
            used_bytes: 0,
            free_head: 0,
            next_block,
            payload,
            payload_layout,
            owner: AtomicPtr::new(std::ptr::null_mut()),
            prev: std::ptr::null_mut(),
            next: std::ptr::null_mut(),
        });

        let raw_sb = Box::into_raw(sb);
        // Write the back-pointer into the head of every slot now that `raw_sb`
        // is a stable address.
        unsafe {
            for i in 0..n {
                let slot = (*raw_sb).slot_ptr(i);
                (slot.as_ptr() as *mut *mut Superblock).write(raw_sb);
            }
        }
        raw_sb
    }

    #[inline]
    fn slot_ptr(&self, index: u32) -> NonNull<u8> {
        let slot_size = BACK_PTR_SIZE + self.block_size;
        // SAFETY: index < n is an invariant of every caller in this module.
        unsafe { NonNull::new_unchecked(self.payload.as_ptr().add(index as usize * slot_size)) }
    }

    #[inline]
    pub(crate) fn class_log2(&self) -> u32 {
        self.class_log2
    }

    #[inline]
    pub(crate) fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub(crate) fn used(&self) -> usize {
        self.used_bytes
    }

    #[inline]
    pub(crate) fn sb_size(&self) -> usize {
        self.sb_size
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.free_head == SENTINEL
    }

    #[inline]
    pub(crate) fn owner(&self) -> *mut Heap {
        self.owner.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_owner(&self, owner: *mut Heap) {
        self.owner.store(owner, Ordering::Release);
    }

    /// Hands out one free block. Precondition: `!self.is_full()`.
    pub(crate) fn get_block(&mut self) -> NonNull<u8> {
        debug_assert!(!self.is_full());
        let i = self.free_head;
        self.free_head = self.next_block[i as usize];
        self.used_bytes += self.block_size;

        let slot = self.slot_ptr(i);
        // SAFETY: slot has room for BACK_PTR_SIZE + block_size bytes; the
        // user pointer starts right after the back-pointer.
        unsafe { NonNull::new_unchecked(slot.as_ptr().add(BACK_PTR_SIZE)) }
    }

    /// Returns a previously handed-out block to the free-list.
    ///
    /// # Safety
    /// `user_ptr` must have been returned by `get_block` on this exact
    /// superblock and not freed since.
    pub(crate) unsafe fn free_block(&mut self, user_ptr: NonNull<u8>) {
        let slot_size = BACK_PTR_SIZE + self.block_size;
        let slot_start = user_ptr.as_ptr().wrapping_sub(BACK_PTR_SIZE);
        let offset = slot_start as usize - self.payload.as_ptr() as usize;
        debug_assert_eq!(offset % slot_size, 0, "misaligned free: not a slot boundary");
        let index = (offset / slot_size) as u32;
        debug_assert!(index < self.n, "free of a pointer outside this superblock");

        self.next_block[index as usize] = self.free_head;
        self.free_head = index;
        self.used_bytes -= self.block_size;
    }

    /// Reads the back-pointer stored immediately before `user_ptr`.
    ///
    /// # Safety
    /// `user_ptr` must be a live pointer previously returned by `alloc`.
    #[inline]
    pub(crate) unsafe fn owner_of(user_ptr: NonNull<u8>) -> *mut Superblock {
        unsafe { *(user_ptr.as_ptr().sub(BACK_PTR_SIZE) as *const *mut Superblock) }
    }

    /// Unlinks this superblock from whatever bucket list it's in. After
    /// this call both `prev` and `next` are null.
    pub(crate) unsafe fn pop(me: *mut Superblock) {
        unsafe {
            let prev = (*me).prev;
            let next = (*me).next;
            if !prev.is_null() {
                (*prev).next = next;
            }
            if !next.is_null() {
                (*next).prev = prev;
            }
            (*me).prev = std::ptr::null_mut();
            (*me).next = std::ptr::null_mut();
        }
    }

    /// Destroys a superblock previously leaked by `new`, releasing its
    /// backing buffer. Callers must have already unlinked it from every
    /// list and cleared its owner.
    pub(crate) unsafe fn destroy(raw: *mut Superblock) {
        unsafe {
            let sb = Box::from_raw(raw);
            alloc::dealloc(sb.payload.as_ptr(), sb.payload_layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_for_size_floors_at_pointer_width() {
        assert_eq!(class_for_size(0), BACK_PTR_SIZE.trailing_zeros());
        assert_eq!(class_for_size(1), BACK_PTR_SIZE.trailing_zeros());
        assert_eq!(1usize << class_for_size(40), 64);
        assert_eq!(1usize << class_for_size(64), 64);
        assert_eq!(1usize << class_for_size(65), 128);
    }

    #[test]
    fn is_large_uses_the_half_sb_threshold() {
        let sb = 1 << 15;
        assert!(!is_large(sb / 2, sb));
        assert!(is_large(sb / 2 + 1, sb));
        assert!(is_large(usize::MAX, sb));
    }

    #[test]
    fn get_block_and_free_block_round_trip() {
        let sb_size = 1 << 15;
        let raw = Superblock::new(6, sb_size); // class 64
        unsafe {
            assert_eq!((*raw).n, (sb_size / 64) as u32);
            let p1 = (*raw).get_block();
            let p2 = (*raw).get_block();
            assert_ne!(p1, p2);
            assert_eq!((*raw).used(), 128);

            (*raw).free_block(p1);
            assert_eq!((*raw).used(), 64);
            (*raw).free_block(p2);
            assert_eq!((*raw).used(), 0);

            Superblock::destroy(raw);
        }
    }

    #[test]
    fn back_pointer_discriminates_owner() {
        let raw = Superblock::new(4, 1 << 15); // class 16
        unsafe {
            let p = (*raw).get_block();
            assert_eq!(Superblock::owner_of(p), raw);
            (*raw).free_block(p);
            Superblock::destroy(raw);
        }
    }
}

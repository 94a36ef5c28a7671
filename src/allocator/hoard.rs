//! `HoardAllocator` — thread-hashed local heaps backed by one global heap
//! (C3). Named `HoardAllocator` rather than `Allocator` to avoid colliding
//! with [`traits::Allocator`](super::traits::Allocator), the trait this
//! type also implements.
//!
//! Grounded on `mtallocator.cpp`'s `MtAllocator::Allocate`/`::Free`: same
//! lock ordering (local heap first, global heap only when a migration is
//! needed, never the reverse), same migration-race retry loop in `free`,
//! same emptiness heuristic gating `ReleaseSuperblock`/`AcquireSuperblock`.

use std::alloc::Layout;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

use crate::config::HoardConfig;
use crate::error::{AllocError, AllocResult};

use super::heap::Heap;
use super::superblock::{self, Superblock};
use super::system::SystemAllocator;
use super::traits::Allocator as _;

/// Heap index 0 is always the global heap; local heaps occupy `1..=M`.
const GLOBAL_HEAP: usize = 0;

/// A Hoard-style concurrent allocator: `M` thread-hashed local heaps plus
/// one global heap that absorbs superblocks released by local heaps once
/// they become mostly empty.
///
/// # Safety contract
/// `allocate`/`free` are safe to call concurrently from any number of
/// threads. `free` requires `ptr` to have been returned by a prior
/// `allocate` on this exact instance and not freed since — the allocator
/// does not detect double-frees or foreign pointers (SPEC_FULL.md §7).
pub struct HoardAllocator {
    sb_size: usize,
    /// `heaps[0]` is the global heap; `heaps[1..]` are the `M` local heaps.
    heaps: Vec<Heap>,
    backing: SystemAllocator,
}

impl HoardAllocator {
    /// Builds an allocator with `config.local_heaps` local heaps plus the
    /// global heap, all empty.
    pub fn new(config: HoardConfig) -> Self {
        let num_classes = config.sb_size.trailing_zeros() as usize + 1;
        let heaps = (0..=config.local_heaps).map(|_| Heap::new(num_classes)).collect();
        Self {
            sb_size: config.sb_size,
            heaps,
            backing: SystemAllocator::new(),
        }
    }

    /// Number of local heaps (excluding the global heap).
    pub fn local_heap_count(&self) -> usize {
        self.heaps.len() - 1
    }

    /// `(allocated, used)` byte counters for one heap: index `0` is the
    /// global heap, `1..=local_heap_count()` are the local heaps. Exists for
    /// diagnostics and for testing the mostly-empty release heuristic
    /// directly rather than inferring it from allocation addresses.
    pub fn heap_usage(&self, heap_index: usize) -> (usize, usize) {
        let guard = self.heaps[heap_index].lock();
        (guard.allocated(), guard.used())
    }

    /// `GetHeap()`: hashes the current thread's id into `1..=M`, matching
    /// the original's `hash(tid) % M + 1` (heap 0 reserved for global).
    fn local_heap_index(&self) -> usize {
        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        let m = self.local_heap_count() as u64;
        (hasher.finish() % m) as usize + 1
    }

    /// `alloc(size)`: routes small requests through the size-classed local
    /// heap / global-heap protocol; routes requests where `2*size > SB`
    /// through the large-allocation passthrough. Returns null on backing
    /// allocator exhaustion (matches the distilled spec's raw `alloc`
    /// contract; the `Allocator`-trait adapter below turns this into a
    /// typed `AllocError` instead).
    pub fn allocate(&self, size: usize) -> *mut u8 {
        if superblock::is_large(size, self.sb_size) {
            return self.allocate_large_raw(size).map_or(std::ptr::null_mut(), |p| p.as_ptr());
        }

        let class = superblock::class_for_size(size);
        let local_idx = self.local_heap_index();

        // 1. Lock the local heap; if it has a non-full superblock of this
        //    class, serve from it and return (fast path, no global lock).
        {
            let mut local = self.heaps[local_idx].lock();
            if let Some(p) = local.allocate(class) {
                return p.as_ptr();
            }
        }

        // 2. Local heap had nothing to serve: lock the global heap (local
        //    lock already dropped — never hold both at once in this
        //    direction) and try to acquire a superblock from it.
        {
            let mut global = self.heaps[GLOBAL_HEAP].lock();
            if let Some(sb) = global.release_superblock_for_class(class) {
                drop(global);
                #[cfg(feature = "logging")]
                tracing::debug!(class, local_idx, "migrating superblock global -> local");
                let mut local = self.heaps[local_idx].lock();
                local.acquire_superblock(&self.heaps[local_idx] as *const Heap as *mut Heap, sb);
                if let Some(p) = local.allocate(class) {
                    return p.as_ptr();
                }
            }
        }

        // 3. Nothing anywhere: allocate a fresh superblock and give it
        //    straight to the local heap.
        #[cfg(feature = "logging")]
        tracing::debug!(class, sb_size = self.sb_size, "constructing new superblock");
        let sb = Superblock::new(class, self.sb_size);
        let mut local = self.heaps[local_idx].lock();
        local.acquire_superblock(&self.heaps[local_idx] as *const Heap as *mut Heap, sb);
        local.allocate(class).map_or(std::ptr::null_mut(), |p| p.as_ptr())
    }

    /// `free(ptr)`: discriminates small vs. large via the back-pointer
    /// (NULL means large), then frees through the owning heap. The owner
    /// is re-read under that heap's lock to guard against a migration
    /// racing with this call — if ownership moved, the lock we took is
    /// stale and we retry against the new owner.
    ///
    /// # Safety
    /// `ptr` must have been returned by `self.allocate` and not freed
    /// since.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let Some(user_ptr) = NonNull::new(ptr) else { return };

        // SAFETY: forwarded from caller's contract.
        let sb = unsafe { Superblock::owner_of(user_ptr) };
        if sb.is_null() {
            // SAFETY: a NULL back-pointer means this came from allocate_large,
            // which prefixes exactly one back-pointer-sized NULL sentinel.
            unsafe { self.free_large_raw(user_ptr) };
            return;
        }

        loop {
            // SAFETY: `sb` is a live superblock for as long as this process's
            // allocator instance is alive; `owner()` is a lock-free atomic
            // read, safe to perform without holding any heap lock.
            let owner = unsafe { (*sb).owner() };
            let heap_idx = self.heap_index_of(owner);
            let mut guard = self.heaps[heap_idx].lock();
            // SAFETY: re-read under the lock we just took; if it no longer
            // matches, a migration raced us and we must retry against the
            // new owner instead of freeing into the wrong heap's counters.
            if unsafe { (*sb).owner() } != owner {
                continue;
            }
            guard.free(user_ptr, sb);

            if heap_idx != GLOBAL_HEAP && Self::should_release(&guard, self.sb_size) {
                if let Some(released) = guard.release_any_superblock() {
                    // `released` is unlinked from `guard`'s heap but its
                    // `owner` field still points at it (release_any_superblock
                    // deliberately leaves `owner` untouched) — a concurrent
                    // `free` on another live block of this same superblock
                    // would see a matching owner and double-account against
                    // this heap if its lock were free here. Per spec.md §4.3
                    // step 6 / §9, acquire the global lock while still
                    // holding `guard` and only release both once the new
                    // owner has been published.
                    #[cfg(feature = "logging")]
                    tracing::debug!(heap_idx, "migrating superblock local -> global");
                    let mut global = self.heaps[GLOBAL_HEAP].lock();
                    global.acquire_superblock(&self.heaps[GLOBAL_HEAP] as *const Heap as *mut Heap, released);
                    drop(global);
                    drop(guard);
                }
            }
            return;
        }
    }

    /// `mostly empty` heuristic from the distilled spec §4.3/§5: a local
    /// heap releases a superblock back to the global heap once
    /// `used < allocated - SB` and `4*used < 3*allocated`.
    fn should_release(heap: &super::heap::HeapGuard<'_>, sb_size: usize) -> bool {
        let allocated = heap.allocated();
        let used = heap.used();
        allocated >= sb_size
            && used < allocated - sb_size
            && 4 * used < 3 * allocated
    }

    fn heap_index_of(&self, owner: *mut Heap) -> usize {
        self.heaps
            .iter()
            .position(|h| h as *const Heap as *mut Heap == owner)
            .expect("superblock owner must be one of this allocator's heaps")
    }

    /// Large-allocation passthrough used by the raw, size-only `allocate`
    /// entry point: payload is aligned to `align_of::<usize>()`, which is
    /// all the raw `alloc(size)` contract promises.
    fn allocate_large_raw(&self, size: usize) -> Option<NonNull<u8>> {
        self.allocate_large(size, std::mem::align_of::<usize>()).ok()
    }

    /// # Safety
    /// `user_ptr` must have been returned by `allocate_large_raw` or
    /// `allocate_large`.
    unsafe fn free_large_raw(&self, user_ptr: NonNull<u8>) {
        // SAFETY: forwarded from caller.
        unsafe { self.free_large(user_ptr) };
    }

    /// `allocate_large(size, align)`: backs the payload with one contiguous
    /// allocation carrying a small metadata header ahead of it. The header
    /// is laid out so its *last* `BACK_PTR_SIZE` bytes — immediately
    /// adjacent to the payload — are a NULL sentinel, matching the layout
    /// `Superblock::owner_of` expects for the small-allocation discriminator
    /// (SPEC_FULL.md §4.3 item 4): metadata fields sit at fixed negative
    /// offsets from the payload pointer, independent of `align`, so `free`
    /// never needs to locate the allocation's base before reading them.
    fn allocate_large(&self, size: usize, align: usize) -> AllocResult<NonNull<u8>> {
        let prefix = large_prefix_len(align);
        let layout = Layout::from_size_align(prefix, align)
            .and_then(|l| l.extend(Layout::from_size_align(size, 1).map_err(|_| unreachable!())?))
            .map(|(combined, _)| combined.pad_to_align())
            .map_err(|_| AllocError::for_size_align(size, align))?;

        // SAFETY: layout.size() > 0 since prefix > 0.
        let base = unsafe { self.backing.allocate(layout) }?.cast::<u8>();
        // SAFETY: base has at least `prefix` bytes ahead of the payload.
        let user_ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(prefix)) };
        unsafe { write_large_meta(user_ptr, size, align) };
        #[cfg(feature = "logging")]
        tracing::debug!(size, align, "large allocation");
        Ok(user_ptr)
    }

    /// # Safety
    /// `user_ptr` must have been returned by `allocate_large`.
    unsafe fn free_large(&self, user_ptr: NonNull<u8>) {
        // SAFETY: forwarded from caller.
        let (size, align) = unsafe { read_large_meta(user_ptr) };
        let prefix = large_prefix_len(align);
        let layout = Layout::from_size_align(prefix, align)
            .and_then(|l| l.extend(Layout::from_size_align(size, 1).unwrap()))
            .map(|(combined, _)| combined.pad_to_align())
            .expect("layout recorded at allocate_large time was already validated");
        // SAFETY: base is `prefix` bytes behind the payload, as written by allocate_large.
        let base = unsafe { NonNull::new_unchecked(user_ptr.as_ptr().sub(prefix)) };
        #[cfg(feature = "logging")]
        tracing::debug!(size, align, "large free");
        unsafe { self.backing.deallocate(base, layout) };
    }
}

/// Metadata stored ahead of every large allocation's payload: `alloc_size`,
/// then `align`, then a `BACK_PTR_SIZE`-wide NULL sentinel immediately
/// before the payload. Each field sits at a fixed offset *from the payload
/// pointer* rather than from the allocation's base, so locating them never
/// depends on knowing `align` first.
const LARGE_META_WORD: usize = std::mem::size_of::<usize>();

fn large_prefix_len(align: usize) -> usize {
    let min = superblock::BACK_PTR_SIZE + 2 * LARGE_META_WORD;
    crate::utils::align_up(min, align)
}

/// # Safety
/// `user_ptr` must have at least `large_prefix_len(align)` readable/writable
/// bytes immediately ahead of it.
unsafe fn write_large_meta(user_ptr: NonNull<u8>, size: usize, align: usize) {
    unsafe {
        (user_ptr.as_ptr().sub(superblock::BACK_PTR_SIZE) as *mut *mut Superblock)
            .write(std::ptr::null_mut());
        (user_ptr.as_ptr().sub(superblock::BACK_PTR_SIZE + LARGE_META_WORD) as *mut usize).write(align);
        (user_ptr.as_ptr().sub(superblock::BACK_PTR_SIZE + 2 * LARGE_META_WORD) as *mut usize).write(size);
    }
}

/// # Safety
/// `user_ptr` must have been written by `write_large_meta`.
unsafe fn read_large_meta(user_ptr: NonNull<u8>) -> (usize, usize) {
    unsafe {
        let align = *(user_ptr.as_ptr().sub(superblock::BACK_PTR_SIZE + LARGE_META_WORD) as *const usize);
        let size = *(user_ptr.as_ptr().sub(superblock::BACK_PTR_SIZE + 2 * LARGE_META_WORD) as *const usize);
        (size, align)
    }
}

/// Plugs `HoardAllocator` into the crate's own allocator trait so it can
/// back collections directly, honoring the caller's requested
/// [`Layout::align`] exactly for large allocations (the large-allocation
/// alignment redesign, SPEC_FULL.md §4.3 item 4) rather than reproducing
/// the original implementation's pointer-only-aligned large path.
unsafe impl super::traits::Allocator for HoardAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        let ptr = if superblock::is_large(layout.size(), self.sb_size) || layout.align() > std::mem::align_of::<usize>() {
            self.allocate_large(layout.size(), layout.align())?
        } else {
            NonNull::new(self.allocate(layout.size())).ok_or_else(|| AllocError::for_size_align(layout.size(), layout.align()))?
        };
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if superblock::is_large(layout.size(), self.sb_size) || layout.align() > std::mem::align_of::<usize>() {
            // SAFETY: forwarded from caller; matches the branch allocate() took.
            unsafe { self.free_large(ptr) };
        } else {
            // SAFETY: forwarded from caller.
            unsafe { self.free(ptr.as_ptr()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HoardConfig;

    fn small_allocator() -> HoardAllocator {
        HoardAllocator::new(HoardConfig::new(1 << 15, 2))
    }

    #[test]
    fn allocate_and_free_round_trip() {
        let alloc = small_allocator();
        let p = alloc.allocate(64);
        assert!(!p.is_null());
        unsafe {
            *(p as *mut u64) = 0xdead_beef;
            assert_eq!(*(p as *const u64), 0xdead_beef);
            alloc.free(p);
        }
    }

    #[test]
    fn zero_size_allocation_is_not_null() {
        let alloc = small_allocator();
        let p = alloc.allocate(0);
        assert!(!p.is_null());
        unsafe { alloc.free(p) };
    }

    #[test]
    fn many_small_allocations_get_distinct_pointers() {
        let alloc = small_allocator();
        let mut ptrs = Vec::new();
        for _ in 0..256 {
            let p = alloc.allocate(32);
            assert!(!p.is_null());
            ptrs.push(p);
        }
        let mut unique = ptrs.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ptrs.len());
        for p in ptrs {
            unsafe { alloc.free(p) };
        }
    }

    #[test]
    fn large_allocation_honors_requested_alignment() {
        let alloc = small_allocator();
        let size = alloc.sb_size; // > SB/2, forces the large path
        let p = alloc.allocate(size);
        assert!(!p.is_null());
        assert_eq!((p as usize) % std::mem::align_of::<usize>(), 0);
        unsafe { alloc.free(p) };
    }

    #[test]
    fn concurrent_allocations_do_not_alias() {
        use std::sync::Arc;
        let alloc = Arc::new(HoardAllocator::new(HoardConfig::new(1 << 15, 4)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let alloc = Arc::clone(&alloc);
                std::thread::spawn(move || {
                    let mut ptrs = Vec::new();
                    for _ in 0..512 {
                        let p = alloc.allocate(48);
                        assert!(!p.is_null());
                        ptrs.push(p);
                    }
                    for p in ptrs {
                        unsafe { alloc.free(p) };
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}

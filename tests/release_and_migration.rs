//! A local heap releases a mostly-empty superblock back to the global heap,
//! and a later local heap can reacquire a previously-global superblock.
//!
//! Pins `local_heaps` to 1 so every thread in this process hashes onto the
//! same local heap, making the heap-index bookkeeping deterministic.

use hoard_alloc::allocator::HoardAllocator;
use hoard_alloc::config::HoardConfig;

const GLOBAL: usize = 0;
const LOCAL: usize = 1;

#[test]
fn mostly_empty_local_heap_releases_a_superblock_to_the_global_heap() {
    let sb_size = 1 << 15;
    let alloc = HoardAllocator::new(HoardConfig::new(sb_size, 1));
    let block_size = 64usize;
    let blocks_per_sb = sb_size / block_size;

    // Fill three superblocks' worth of 64-byte blocks so the local heap owns
    // `allocated == 3 * SB`.
    let mut ptrs = Vec::new();
    for _ in 0..(blocks_per_sb * 3) {
        let p = alloc.allocate(block_size);
        assert!(!p.is_null());
        ptrs.push(p);
    }

    let (allocated_before, _) = alloc.heap_usage(LOCAL);
    assert_eq!(allocated_before, sb_size * 3);
    assert_eq!(alloc.heap_usage(GLOBAL), (0, 0));

    // Free down to a single live block: used << allocated, heuristic fires
    // on the next free that crosses the threshold.
    for p in ptrs.drain(1..) {
        unsafe { alloc.free(p) };
    }

    let (allocated_after, used_after) = alloc.heap_usage(LOCAL);
    assert!(
        allocated_after < allocated_before,
        "expected a superblock to move to the global heap: allocated {allocated_before} -> {allocated_after}"
    );
    assert_eq!(used_after, block_size);

    let (global_allocated, _) = alloc.heap_usage(GLOBAL);
    assert_eq!(global_allocated, allocated_before - allocated_after);

    unsafe { alloc.free(ptrs[0]) };
}

#[test]
fn a_released_superblock_is_reacquired_by_the_next_allocation_of_its_class() {
    let sb_size = 1 << 15;
    let alloc = HoardAllocator::new(HoardConfig::new(sb_size, 1));
    let block_size = 128usize;
    let blocks_per_sb = sb_size / block_size;

    let mut ptrs = Vec::new();
    for _ in 0..(blocks_per_sb * 3) {
        ptrs.push(alloc.allocate(block_size));
    }
    for p in ptrs.drain(1..) {
        unsafe { alloc.free(p) };
    }
    let (_, global_used_before) = alloc.heap_usage(GLOBAL);
    assert_eq!(global_used_before, 0, "a released superblock is mostly empty, not completely empty in general, but this scenario drains it fully");

    // The local heap is down to one live block; the next allocation of this
    // class should reuse the existing non-full superblock (fast path) before
    // ever touching the global heap again.
    let (allocated_before, _) = alloc.heap_usage(LOCAL);
    let extra = alloc.allocate(block_size);
    assert!(!extra.is_null());
    let (allocated_after, _) = alloc.heap_usage(LOCAL);
    assert_eq!(allocated_before, allocated_after, "serving from an existing superblock must not grow `allocated`");

    unsafe {
        alloc.free(ptrs[0]);
        alloc.free(extra);
    }
}

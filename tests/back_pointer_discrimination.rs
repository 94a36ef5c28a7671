//! Small and large allocations must never be confused with each other:
//! freeing either kind through the same `free` entry point must route to
//! the correct reclamation path.

use hoard_alloc::allocator::HoardAllocator;
use hoard_alloc::config::HoardConfig;

#[test]
fn small_and_large_allocations_coexist_and_free_correctly() {
    let alloc = HoardAllocator::new(HoardConfig::new(1 << 15, 2));

    // Comfortably below SB/2: small path.
    let small = alloc.allocate(128);
    // Comfortably above SB/2: large passthrough.
    let large = alloc.allocate((1 << 15) * 4);

    assert!(!small.is_null());
    assert!(!large.is_null());
    assert_ne!(small, large);

    unsafe {
        small.write_bytes(0x11, 128);
        large.write_bytes(0x22, (1 << 15) * 4);
        assert_eq!(*small, 0x11);
        assert_eq!(*large, 0x22);

        alloc.free(small);
        alloc.free(large);
    }
}

#[test]
fn large_allocation_right_at_the_threshold_stays_in_the_superblock_path() {
    let sb_size = 1 << 15;
    let alloc = HoardAllocator::new(HoardConfig::new(sb_size, 2));

    // Exactly SB/2: still small per the `2*size > SB` threshold.
    let p = alloc.allocate(sb_size / 2);
    assert!(!p.is_null());
    unsafe {
        p.write_bytes(0x33, sb_size / 2);
        alloc.free(p);
    }
}

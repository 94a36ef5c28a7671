//! Every small allocation comes back from the size class its request was
//! rounded up to, and round-trips through `alloc`/`free` without touching
//! neighboring blocks.

use hoard_alloc::{alloc, free};

#[test]
fn round_trips_across_every_size_class_up_to_half_a_superblock() {
    let sizes = [1usize, 2, 3, 8, 15, 16, 17, 63, 64, 127, 256, 1024, 4096, 1 << 14];
    for &size in &sizes {
        let p = alloc(size);
        assert!(!p.is_null(), "alloc({size}) returned null");
        unsafe {
            p.write_bytes(0xa5, size);
            for i in 0..size {
                assert_eq!(*p.add(i), 0xa5, "byte {i} corrupted for size {size}");
            }
            free(p);
        }
    }
}

#[test]
fn many_allocations_of_the_same_class_never_alias() {
    let mut ptrs = Vec::new();
    for _ in 0..2000 {
        let p = alloc(48);
        assert!(!p.is_null());
        ptrs.push(p);
    }
    let mut sorted = ptrs.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), ptrs.len(), "two live allocations shared an address");
    for p in ptrs {
        unsafe { free(p) };
    }
}

//! Property-based checks for SPEC_FULL.md §8 P1-P5: non-overlapping live
//! blocks, correct `used` accounting, and heap-level byte bookkeeping, driven
//! by arbitrary interleavings of `alloc`/`free` against a single allocator
//! instance (single-threaded — the sequential consistency properties, not
//! the concurrency ones, which `tests/concurrency_stress.rs` covers).

use proptest::prelude::*;

use hoard_alloc::allocator::HoardAllocator;
use hoard_alloc::config::HoardConfig;

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    FreeOldest,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..=8192).prop_map(Op::Alloc),
        1 => Just(Op::FreeOldest),
    ]
}

proptest! {
    /// P1: at every quiescent point, every live returned pointer occupies a
    /// disjoint byte range from every other live pointer.
    #[test]
    fn live_allocations_never_overlap(ops in prop::collection::vec(op_strategy(), 1..300)) {
        let alloc = HoardAllocator::new(HoardConfig::new(1 << 15, 1));
        let mut live: Vec<(*mut u8, usize)> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(size) => {
                    let p = alloc.allocate(size);
                    prop_assert!(!p.is_null());
                    let start = p as usize;
                    let end = start + size;
                    for &(other, other_size) in &live {
                        let o_start = other as usize;
                        let o_end = o_start + other_size;
                        prop_assert!(end <= o_start || start >= o_end,
                            "new allocation [{start:#x}, {end:#x}) overlaps live [{o_start:#x}, {o_end:#x})");
                    }
                    live.push((p, size));
                }
                Op::FreeOldest => {
                    if !live.is_empty() {
                        let (p, _) = live.remove(0);
                        unsafe { alloc.free(p) };
                    }
                }
            }
        }

        for (p, _) in live {
            unsafe { alloc.free(p) };
        }
    }

    /// P5: `free(alloc(n))` for any legal n leaves the allocator usable —
    /// round-tripping a single allocation never corrupts later allocations.
    #[test]
    fn single_alloc_free_round_trip_never_corrupts_later_state(
        sizes in prop::collection::vec(1usize..=20000, 1..50)
    ) {
        let alloc = HoardAllocator::new(HoardConfig::new(1 << 15, 1));
        for size in sizes {
            let p = alloc.allocate(size);
            prop_assert!(!p.is_null());
            unsafe {
                p.write_bytes(0x5a, size.min(64));
                prop_assert_eq!(*p, 0x5a);
                alloc.free(p);
            }
        }
        // The allocator must still serve a plain allocation afterward.
        let p = alloc.allocate(32);
        prop_assert!(!p.is_null());
        unsafe { alloc.free(p) };
    }

    /// P3: a local heap's `used` tracks exactly the sum of live bytes it
    /// currently holds out, for any sequence of same-class alloc/free.
    #[test]
    fn heap_used_tracks_live_bytes_of_one_size_class(
        actions in prop::collection::vec(any::<bool>(), 1..400)
    ) {
        let block_size = 64usize;
        let alloc = HoardAllocator::new(HoardConfig::new(1 << 15, 1));
        let mut live = Vec::new();

        for allocate in actions {
            if allocate || live.is_empty() {
                live.push(alloc.allocate(block_size));
            } else {
                let p = live.pop().unwrap();
                unsafe { alloc.free(p) };
            }
        }

        let expected_used: usize = live.len() * block_size;
        let (_, local_used) = alloc.heap_usage(1);
        let (_, global_used) = alloc.heap_usage(0);
        prop_assert_eq!(local_used + global_used, expected_used);

        for p in live {
            unsafe { alloc.free(p) };
        }
    }
}

//! Scenario 5 (concurrency stress) and scenario 6 (ownership race) from
//! SPEC_FULL.md §8: many threads racing `alloc`/`free` against each other,
//! with pointers frequently freed by a thread other than the one that
//! allocated them so `free`'s migration-race retry loop actually exercises.

use std::sync::mpsc;
use std::sync::Arc;

use hoard_alloc::allocator::HoardAllocator;
use hoard_alloc::config::HoardConfig;
use rand::Rng;

/// N threads each allocate and immediately hand the pointer to a shared
/// channel; M separate threads drain the channel and free whatever arrives.
/// Since a thread hashes to a fixed local heap but the freeing thread is
/// essentially random, `free` very often runs on a non-owning heap.
#[test]
fn many_threads_alloc_while_other_threads_free_across_heaps() {
    let sb_size = 1 << 15;
    let alloc = Arc::new(HoardAllocator::new(HoardConfig::new(sb_size, 4)));
    let (tx, rx) = mpsc::channel::<*mut u8>();
    let rx = Arc::new(std::sync::Mutex::new(rx));

    const PRODUCERS: usize = 6;
    const PER_PRODUCER: usize = 300;
    const CONSUMERS: usize = 3;

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|seed| {
            let alloc = Arc::clone(&alloc);
            let tx = tx.clone();
            std::thread::spawn(move || {
                let mut rng = rand::rng();
                for _ in 0..PER_PRODUCER {
                    let size = rng.random_range(1..=(sb_size / 2));
                    let p = alloc.allocate(size);
                    assert!(!p.is_null());
                    unsafe { p.write_bytes(0x7e, 1) };
                    tx.send(p).expect("consumers outlive producers");
                }
            })
        })
        .collect();
    drop(tx);

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            let rx = Arc::clone(&rx);
            std::thread::spawn(move || loop {
                let next = rx.lock().unwrap().recv();
                match next {
                    Ok(p) => unsafe { alloc.free(p) },
                    Err(_) => break,
                }
            })
        })
        .collect();

    for h in producers {
        h.join().unwrap();
    }
    for h in consumers {
        h.join().unwrap();
    }

    // Every pointer produced was freed; every heap (local and global) must be
    // back to zero outstanding bytes.
    for idx in 0..=alloc.local_heap_count() {
        let (_, used) = alloc.heap_usage(idx);
        assert_eq!(used, 0, "heap {idx} still has {used} bytes outstanding");
    }
}

/// Scenario 3: a block allocated on one thread's local heap, freed from
/// another thread, does not itself trigger migration — ownership only moves
/// through the explicit release/acquire protocol in `free`'s emptiness check.
#[test]
fn freeing_from_a_foreign_thread_does_not_move_a_single_block() {
    let sb_size = 1 << 15;
    let alloc = Arc::new(HoardAllocator::new(HoardConfig::new(sb_size, 4)));

    let producer_alloc = Arc::clone(&alloc);
    let p = std::thread::spawn(move || producer_alloc.allocate(100))
        .join()
        .unwrap();
    assert!(!p.is_null());

    let consumer_alloc = Arc::clone(&alloc);
    std::thread::spawn(move || unsafe { consumer_alloc.free(p) })
        .join()
        .unwrap();
}

/// Scenario 6: one thread repeatedly frees blocks from a superblock that is
/// concurrently migrating (local -> global -> local) under other threads'
/// traffic. The owner-reload-under-lock retry in `free` must never corrupt
/// either heap's counters: drain everything at the end and expect zeros.
#[test]
fn free_survives_concurrent_superblock_migration() {
    let sb_size = 1 << 15;
    let alloc = Arc::new(HoardAllocator::new(HoardConfig::new(sb_size, 2)));
    let block_size = 64usize;

    let churners: Vec<_> = (0..4)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            std::thread::spawn(move || {
                let mut live = Vec::new();
                for round in 0..200 {
                    let p = alloc.allocate(block_size);
                    assert!(!p.is_null());
                    live.push(p);
                    // Periodically free everything but one block, which is
                    // exactly the pattern that drives the emptiness
                    // heuristic and forces superblocks to migrate while
                    // other threads are freeing through the same owner.
                    if round % 17 == 0 && live.len() > 1 {
                        for p in live.drain(..live.len() - 1) {
                            unsafe { alloc.free(p) };
                        }
                    }
                }
                live
            })
        })
        .collect();

    for h in churners {
        let leftovers = h.join().unwrap();
        for p in leftovers {
            unsafe { alloc.free(p) };
        }
    }

    for idx in 0..=alloc.local_heap_count() {
        let (_, used) = alloc.heap_usage(idx);
        assert_eq!(used, 0, "heap {idx} still has {used} bytes outstanding after full drain");
    }
}

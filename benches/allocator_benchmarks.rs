//! Benchmarks for the Hoard-style allocator against the system allocator
//! baseline: single-threaded alloc/free latency by size class, and a
//! multi-threaded throughput comparison that exercises the local/global
//! heap protocol under contention.

use std::alloc::Layout;
use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hoard_alloc::allocator::HoardAllocator;
use hoard_alloc::config::HoardConfig;

fn bench_single_threaded_alloc_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_threaded_alloc_free");
    let alloc = HoardAllocator::new(HoardConfig::new(1 << 15, 1));

    for &size in &[16usize, 64, 256, 1024, 4096] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("hoard", size), &size, |b, &size| {
            b.iter(|| {
                let p = alloc.allocate(size);
                black_box(p);
                unsafe { alloc.free(p) };
            });
        });

        group.bench_with_input(BenchmarkId::new("system", size), &size, |b, &size| {
            let layout = Layout::from_size_align(size, 8).unwrap();
            b.iter(|| unsafe {
                let p = std::alloc::alloc(layout);
                black_box(p);
                std::alloc::dealloc(p, layout);
            });
        });
    }

    group.finish();
}

fn bench_contended_multi_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_multi_thread");
    group.throughput(Throughput::Elements(1024));

    for &threads in &[2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::new("hoard", threads), &threads, |b, &threads| {
            let alloc = Arc::new(HoardAllocator::new(HoardConfig::new(1 << 15, threads)));
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let alloc = Arc::clone(&alloc);
                        std::thread::spawn(move || {
                            let mut ptrs = Vec::with_capacity(128);
                            for _ in 0..128 {
                                ptrs.push(alloc.allocate(64));
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
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_threaded_alloc_free, bench_contended_multi_thread);
criterion_main!(benches);

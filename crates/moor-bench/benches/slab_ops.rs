//! Criterion micro-benchmarks for slab allocation, truncation, and traversal.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use moor_arena::{ArenaConfig, SlabAllocator};
use moor_bench::object_pool;

fn allocator(slab_size: u32) -> SlabAllocator {
    SlabAllocator::new(&ArenaConfig::new(slab_size)).unwrap()
}

/// 10K adds into an empty allocator, crossing slab boundaries.
fn bench_add_10k(c: &mut Criterion) {
    let objects = object_pool(16);
    c.bench_function("slab_add_10k", |b| {
        b.iter_batched(
            || allocator(1024),
            |mut alloc| {
                for i in 0..10_000 {
                    black_box(alloc.add(&objects[i % objects.len()]).unwrap());
                }
                alloc
            },
            BatchSize::SmallInput,
        );
    });
}

/// Add 10K then truncate back to a mid-slab checkpoint.
fn bench_truncate_to_checkpoint(c: &mut Criterion) {
    let objects = object_pool(16);
    c.bench_function("slab_truncate_5k", |b| {
        b.iter_batched(
            || {
                let mut alloc = allocator(1024);
                for i in 0..5_000 {
                    alloc.add(&objects[i % objects.len()]).unwrap();
                }
                let checkpoint = alloc.checkpoint();
                for i in 0..5_000 {
                    alloc.add(&objects[i % objects.len()]).unwrap();
                }
                (alloc, checkpoint)
            },
            |(mut alloc, checkpoint)| {
                black_box(alloc.delete(Some(checkpoint.next_free())).unwrap());
                alloc
            },
            BatchSize::SmallInput,
        );
    });
}

/// Visit every slot of a 10K-slot allocator.
fn bench_iterate_10k(c: &mut Criterion) {
    let objects = object_pool(16);
    let mut alloc = allocator(1024);
    for i in 0..10_000 {
        alloc.add(&objects[i % objects.len()]).unwrap();
    }
    c.bench_function("slab_iterate_10k", |b| {
        b.iter(|| {
            let mut occupied = 0usize;
            alloc.iterate(|_, slot| {
                if !slot.is_empty() {
                    occupied += 1;
                }
            });
            black_box(occupied)
        });
    });
}

criterion_group!(
    benches,
    bench_add_10k,
    bench_truncate_to_checkpoint,
    bench_iterate_10k
);
criterion_main!(benches);

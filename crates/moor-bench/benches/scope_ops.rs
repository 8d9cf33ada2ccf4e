//! Criterion benchmarks for handle scopes, persistents, and the weak sweep.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use moor_bench::{bench_isolate, object_pool, weak_population};

/// Open a scope, create 256 locals, close it.
fn bench_scope_cycle(c: &mut Criterion) {
    let iso = bench_isolate(1024);
    let _entered = iso.entered();
    let objects = object_pool(16);
    c.bench_function("scope_cycle_256_locals", |b| {
        b.iter(|| {
            let scope = iso.handle_scope().unwrap();
            for obj in objects.iter().cycle().take(256) {
                black_box(scope.create(obj).unwrap());
            }
            scope.close().unwrap();
        });
    });
}

/// Nested scopes escaping one local per level.
fn bench_nested_escape(c: &mut Criterion) {
    let iso = bench_isolate(1024);
    let _entered = iso.entered();
    let objects = object_pool(1);
    c.bench_function("escape_through_8_scopes", |b| {
        b.iter(|| {
            let outer = iso.handle_scope().unwrap();
            let mut local = outer.create(&objects[0]).unwrap();
            for _ in 0..8 {
                let inner = iso.handle_scope().unwrap();
                let again = inner.create(&objects[0]).unwrap();
                local = inner.escape(again).unwrap();
            }
            black_box(local);
            outer.close().unwrap();
        });
    });
}

/// Sweep 1K near-death weak persistents, reviving every tenth.
///
/// Persistent storage never reuses a slot, so each batch gets its own
/// isolate.
fn bench_weak_sweep_1k(c: &mut Criterion) {
    c.bench_function("weak_sweep_1k", |b| {
        b.iter_batched(
            || {
                let iso = bench_isolate(1024);
                let entered = iso.entered();
                let objects = object_pool(1_000);
                let handles = weak_population(&iso, &objects, 10).unwrap();
                (iso, entered, objects, handles)
            },
            |(iso, entered, objects, handles)| {
                black_box(iso.collect_weak());
                for handle in handles {
                    iso.dispose(handle).unwrap();
                }
                drop(entered);
                objects
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_scope_cycle,
    bench_nested_escape,
    bench_weak_sweep_1k
);
criterion_main!(benches);

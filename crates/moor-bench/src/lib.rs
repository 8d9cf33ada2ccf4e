//! Benchmark fixtures for the Moor handle layer.
//!
//! - [`object_pool`]: a fixed set of objects to reference repeatedly
//! - [`bench_isolate`]: an isolate sized for benchmark workloads
//! - [`weak_population`]: persistents made weak, ready for a sweep

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use moor_arena::ArenaConfig;
use moor_core::{HandleError, Object};
use moor_isolate::{Isolate, IsolateConfig, Persistent, WeakOutcome, WeakParam};

/// `count` fresh objects with `u64` payloads `0..count`.
pub fn object_pool(count: usize) -> Vec<Object> {
    (0..count as u64).map(Object::new).collect()
}

/// An isolate with `slab_size`-slot slabs for both locals and persistents.
///
/// # Panics
///
/// If `slab_size` is 0 or `u32::MAX`.
pub fn bench_isolate(slab_size: u32) -> Arc<Isolate> {
    let config = IsolateConfig {
        locals: ArenaConfig::new(slab_size),
        persistents: ArenaConfig::new(slab_size),
        ..IsolateConfig::default()
    };
    match Isolate::new(config) {
        Ok(iso) => iso,
        Err(e) => panic!("benchmark isolate config rejected: {e}"),
    }
}

/// Make one persistent per object and weaken every one. Objects with no
/// other referrer are near death when this returns. `revive_every` makes
/// every n-th callback revive its handle (0 means never).
///
/// The calling thread must have entered `iso`.
pub fn weak_population(
    iso: &Isolate,
    objects: &[Object],
    revive_every: usize,
) -> Result<Vec<Persistent>, HandleError> {
    let mut handles = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        let handle = iso.make_persistent(obj)?;
        let revive = revive_every != 0 && i % revive_every == 0;
        iso.make_weak(handle, WeakParam(i), move |_| {
            if revive {
                WeakOutcome::Revive
            } else {
                WeakOutcome::Release
            }
        })?;
        handles.push(handle);
    }
    Ok(handles)
}

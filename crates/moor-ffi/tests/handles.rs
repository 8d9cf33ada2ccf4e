//! The C surface driven end to end from Rust.

use std::ptr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use moor_ffi::isolate::{
    moor_collect, moor_isolate_create, moor_isolate_destroy, moor_isolate_enter,
    moor_isolate_exit, moor_isolate_stats,
};
use moor_ffi::object::{
    moor_object_is_destroyed, moor_object_new, moor_object_payload, moor_object_refcount,
    moor_object_release,
};
use moor_ffi::persistent::{
    moor_persistent_clear_weak, moor_persistent_dispose, moor_persistent_is_near_death,
    moor_persistent_is_weak, moor_persistent_make_weak, moor_persistent_new,
};
use moor_ffi::scope::{
    moor_local_get, moor_local_new, moor_scope_close, moor_scope_escape, moor_scope_open,
};
use moor_ffi::{MoorIsolateConfig, MoorIsolateStats, MoorStatus, MoorSweepReport, MOOR_NULL_SLOT};

const OK: i32 = MoorStatus::Ok as i32;

fn entered_isolate(config: Option<&MoorIsolateConfig>) -> u64 {
    let mut h = 0u64;
    let cfg = config.map_or(ptr::null(), |c| c as *const _);
    assert_eq!(moor_isolate_create(cfg, &mut h), OK);
    assert_eq!(moor_isolate_enter(h), OK);
    h
}

fn teardown(iso: u64) {
    assert_eq!(moor_isolate_exit(iso), OK);
    assert_eq!(moor_isolate_destroy(iso), OK);
}

fn object(payload: u64) -> u64 {
    let mut h = 0u64;
    assert_eq!(moor_object_new(payload, &mut h), OK);
    h
}

fn strong_count(obj: u64) -> u32 {
    let mut strong = 0u32;
    assert_eq!(moor_object_refcount(obj, &mut strong, ptr::null_mut()), OK);
    strong
}

fn is_destroyed(obj: u64) -> bool {
    let mut out = 0u8;
    assert_eq!(moor_object_is_destroyed(obj, &mut out), OK);
    out == 1
}

#[test]
fn locals_are_released_when_their_scope_closes() {
    let iso = entered_isolate(None);
    let obj = object(7);
    let mut scope = 0u64;
    assert_eq!(moor_scope_open(iso, &mut scope), OK);

    let first = moor_local_new(iso, obj);
    let second = moor_local_new(iso, obj);
    assert_ne!(first.slot, MOOR_NULL_SLOT);
    assert_eq!(second.next_free, first.next_free + 1);
    assert_eq!(strong_count(obj), 2);

    let mut resolved = 0u64;
    assert_eq!(moor_local_get(iso, scope, first.slot, &mut resolved), OK);
    let mut payload = 0u64;
    assert_eq!(moor_object_payload(resolved, &mut payload), OK);
    assert_eq!(payload, 7);

    let mut stats = MoorIsolateStats::default();
    assert_eq!(moor_isolate_stats(iso, &mut stats), OK);
    assert_eq!((stats.local_slots, stats.open_scopes), (2, 1));

    assert_eq!(moor_scope_close(iso, scope), OK);
    assert!(is_destroyed(obj));
    assert_eq!(
        moor_local_get(iso, scope, first.slot, &mut resolved),
        MoorStatus::StaleHandle as i32
    );

    moor_object_release(resolved);
    moor_object_release(obj);
    teardown(iso);
}

#[test]
fn local_without_scope_is_null() {
    let iso = entered_isolate(None);
    let obj = object(1);
    assert_eq!(moor_local_new(iso, obj).slot, MOOR_NULL_SLOT);
    assert_eq!(moor_local_new(iso, 0).slot, MOOR_NULL_SLOT);
    moor_object_release(obj);
    teardown(iso);
}

#[test]
fn escape_moves_local_to_parent() {
    let iso = entered_isolate(None);
    let obj = object(3);
    let (mut outer, mut inner) = (0u64, 0u64);
    assert_eq!(moor_scope_open(iso, &mut outer), OK);
    assert_eq!(moor_scope_open(iso, &mut inner), OK);
    let local = moor_local_new(iso, obj);
    moor_local_new(iso, obj);

    let mut moved = 0u64;
    assert_eq!(moor_scope_escape(iso, inner, local.slot, &mut moved), OK);
    assert_eq!(strong_count(obj), 1);
    assert_eq!(moor_scope_close(iso, inner), MoorStatus::ScopeMisuse as i32);

    let mut resolved = 0u64;
    assert_eq!(moor_local_get(iso, outer, moved, &mut resolved), OK);
    assert_eq!(moor_scope_close(iso, outer), OK);
    assert!(is_destroyed(obj));

    moor_object_release(resolved);
    moor_object_release(obj);
    teardown(iso);
}

#[test]
fn strong_persistent_outlives_scopes() {
    let iso = entered_isolate(None);
    let obj = object(5);
    let mut slot = 0u64;
    assert_eq!(moor_persistent_new(iso, obj, &mut slot), OK);
    assert_ne!(slot, MOOR_NULL_SLOT);

    let mut scope = 0u64;
    moor_scope_open(iso, &mut scope);
    moor_local_new(iso, obj);
    moor_scope_close(iso, scope);
    assert!(!is_destroyed(obj));

    assert_eq!(moor_persistent_dispose(iso, slot), OK);
    assert!(is_destroyed(obj));
    moor_object_release(obj);
    teardown(iso);
}

static WEAK_CALLS: AtomicUsize = AtomicUsize::new(0);
static WEAK_PARAM: AtomicU64 = AtomicU64::new(0);

extern "C" fn record_and_release(_slot: u64, param: usize) -> i32 {
    WEAK_CALLS.fetch_add(1, Ordering::SeqCst);
    WEAK_PARAM.store(param as u64, Ordering::SeqCst);
    0
}

extern "C" fn revive(_slot: u64, _param: usize) -> i32 {
    1
}

#[test]
fn weak_handle_callback_runs_and_object_dies() {
    let iso = entered_isolate(None);
    let obj = object(9);
    let mut slot = 0u64;
    moor_persistent_new(iso, obj, &mut slot);
    assert_eq!(
        moor_persistent_make_weak(iso, slot, 77, Some(record_and_release)),
        OK
    );

    let mut flag = 0u8;
    assert_eq!(moor_persistent_is_weak(iso, slot, &mut flag), OK);
    assert_eq!(flag, 1);
    assert_eq!(moor_persistent_is_near_death(iso, slot, &mut flag), OK);
    assert_eq!(flag, 1);

    let mut report = MoorSweepReport::default();
    assert_eq!(moor_collect(iso, &mut report), OK);
    assert_eq!(report.invoked, 1);
    assert_eq!(report.destroyed, 1);
    assert_eq!(WEAK_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(WEAK_PARAM.load(Ordering::SeqCst), 77);
    assert!(is_destroyed(obj));

    // Disposing a slot the sweep already zeroed is tolerated.
    assert_eq!(moor_persistent_dispose(iso, slot), OK);
    moor_object_release(obj);
    teardown(iso);
}

#[test]
fn slot_zeroed_by_sweep_is_not_reissued() {
    let iso = entered_isolate(None);
    let doomed = object(1);
    let kept = object(2);
    let mut stale = 0u64;
    moor_persistent_new(iso, doomed, &mut stale);
    assert_eq!(moor_persistent_make_weak(iso, stale, 0, None), OK);
    moor_collect(iso, ptr::null_mut());
    assert!(is_destroyed(doomed));

    let mut fresh = 0u64;
    assert_eq!(moor_persistent_new(iso, kept, &mut fresh), OK);
    assert_ne!(fresh, stale);
    assert_eq!(moor_persistent_dispose(iso, stale), OK);
    assert_eq!(strong_count(kept), 1);
    assert!(!is_destroyed(kept));

    moor_persistent_dispose(iso, fresh);
    moor_object_release(doomed);
    moor_object_release(kept);
    teardown(iso);
}

#[test]
fn reviving_callback_keeps_object() {
    let iso = entered_isolate(None);
    let obj = object(2);
    let mut slot = 0u64;
    moor_persistent_new(iso, obj, &mut slot);
    moor_persistent_make_weak(iso, slot, 0, Some(revive));

    let mut report = MoorSweepReport::default();
    moor_collect(iso, &mut report);
    assert_eq!((report.revived, report.destroyed), (1, 0));
    assert_eq!(strong_count(obj), 1);

    let mut flag = 1u8;
    moor_persistent_is_weak(iso, slot, &mut flag);
    assert_eq!(flag, 0);
    moor_persistent_dispose(iso, slot);
    moor_object_release(obj);
    teardown(iso);
}

#[test]
fn cleared_weakness_survives_collection() {
    let iso = entered_isolate(None);
    let obj = object(4);
    let mut slot = 0u64;
    moor_persistent_new(iso, obj, &mut slot);
    moor_persistent_make_weak(iso, slot, 0, None);
    assert_eq!(moor_persistent_clear_weak(iso, slot), OK);
    assert_eq!(moor_collect(iso, ptr::null_mut()), OK);
    assert!(!is_destroyed(obj));
    moor_persistent_dispose(iso, slot);
    moor_object_release(obj);
    teardown(iso);
}

static FATALS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn count_fatal(_location: *const std::os::raw::c_char, _message: *const std::os::raw::c_char) {
    FATALS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn exhaustion_is_fatal_then_engine_dead() {
    let config = MoorIsolateConfig {
        persistent_slab_size: 1,
        persistent_max_slabs: 1,
        fatal: Some(count_fatal),
        ..MoorIsolateConfig::default()
    };
    let iso = entered_isolate(Some(&config));
    let obj = object(0);
    let mut slot = 0u64;
    assert_eq!(moor_persistent_new(iso, obj, &mut slot), OK);
    assert_eq!(
        moor_persistent_new(iso, obj, &mut slot),
        MoorStatus::ResourceExhausted as i32
    );
    assert_eq!(
        moor_persistent_new(iso, obj, &mut slot),
        MoorStatus::EngineDead as i32
    );
    assert_eq!(slot, MOOR_NULL_SLOT);
    assert_eq!(FATALS.load(Ordering::SeqCst), 2);
    moor_object_release(obj);
    teardown(iso);
}

#[test]
fn destroyed_isolate_handle_is_invalid() {
    let iso = entered_isolate(None);
    teardown(iso);
    let mut scope = 0u64;
    assert_eq!(
        moor_scope_open(iso, &mut scope),
        MoorStatus::InvalidHandle as i32
    );
    assert_eq!(
        moor_persistent_dispose(iso, 0),
        MoorStatus::InvalidHandle as i32
    );
}

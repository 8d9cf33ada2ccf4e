//! Persistent handles and weak references.
//!
//! Persistent handles cross the boundary as raw slot addresses. A weak
//! callback is a C function pointer; it runs during `moor_collect` and
//! must not call back into the library.

use moor_core::{HandleError, SlotAddr};
use moor_isolate::{Isolate, Persistent, WeakOutcome, WeakParam};

use crate::isolate::get_isolate;
use crate::object::get_object;
use crate::status::MoorStatus;
use crate::types::{MoorWeakCallback, MOOR_NULL_SLOT};
use crate::write_out;

fn persistent(iso: &Isolate, slot: u64) -> Persistent {
    Persistent::new(iso.id(), SlotAddr::from_raw(slot))
}

fn status(result: Result<(), HandleError>) -> i32 {
    match result {
        Ok(()) => MoorStatus::Ok as i32,
        Err(e) => MoorStatus::from(&e) as i32,
    }
}

/// Create a strong persistent handle to `object` and write its slot.
///
/// After a fatal error writes `MOOR_NULL_SLOT` and returns
/// `MOOR_STATUS_ENGINE_DEAD`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_persistent_new(isolate: u64, object: u64, slot_out: *mut u64) -> i32 {
    ffi_guard!({
        if slot_out.is_null() {
            return MoorStatus::InvalidArgument as i32;
        }
        let (Some(iso), Some(obj)) = (get_isolate(isolate), get_object(object)) else {
            return MoorStatus::InvalidHandle as i32;
        };
        match iso.make_persistent(&obj) {
            Ok(handle) => {
                write_out(slot_out, handle.slot().to_raw());
                MoorStatus::Ok as i32
            }
            Err(e) => {
                write_out(slot_out, MOOR_NULL_SLOT);
                MoorStatus::from(&e) as i32
            }
        }
    })
}

/// Release a persistent handle.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_persistent_dispose(isolate: u64, slot: u64) -> i32 {
    ffi_guard!({
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        status(iso.dispose(persistent(&iso, slot)))
    })
}

/// Make a persistent handle weak. `callback` may be null, in which case
/// the handle is simply cleared once its object is near death.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_persistent_make_weak(
    isolate: u64,
    slot: u64,
    param: usize,
    callback: MoorWeakCallback,
) -> i32 {
    ffi_guard!({
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        let result = iso.make_weak(persistent(&iso, slot), WeakParam(param), move |info| {
            match callback {
                Some(cb) if cb(info.slot.to_raw(), info.param.0) != 0 => WeakOutcome::Revive,
                _ => WeakOutcome::Release,
            }
        });
        status(result)
    })
}

/// Make a weak persistent handle strong again.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_persistent_clear_weak(isolate: u64, slot: u64) -> i32 {
    ffi_guard!({
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        status(iso.clear_weakness(persistent(&iso, slot)))
    })
}

/// Write 1 to `out` if the handle is weak.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_persistent_is_weak(isolate: u64, slot: u64, out: *mut u8) -> i32 {
    ffi_guard!({
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        if !write_out(out, u8::from(iso.is_weak(persistent(&iso, slot)))) {
            return MoorStatus::InvalidArgument as i32;
        }
        MoorStatus::Ok as i32
    })
}

/// Write 1 to `out` if the handle is weak and only weak handles reach
/// its object.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_persistent_is_near_death(isolate: u64, slot: u64, out: *mut u8) -> i32 {
    ffi_guard!({
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        if !write_out(out, u8::from(iso.is_near_death(persistent(&iso, slot)))) {
            return MoorStatus::InvalidArgument as i32;
        }
        MoorStatus::Ok as i32
    })
}

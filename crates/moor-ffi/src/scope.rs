//! Handle scopes and local handles for the calling thread.
//!
//! Scopes are identified by their raw [`ScopeId`] and locals by their raw
//! slot address. Both are only meaningful on the thread that opened the
//! scope.

use moor_core::{ScopeId, SlotAddr};
use moor_isolate::Local;

use crate::isolate::get_isolate;
use crate::object::{get_object, insert_object};
use crate::status::MoorStatus;
use crate::types::MoorSlotRef;
use crate::write_out;

/// Open a handle scope on the calling thread and write its id.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_scope_open(isolate: u64, scope_out: *mut u64) -> i32 {
    ffi_guard!({
        if scope_out.is_null() {
            return MoorStatus::InvalidArgument as i32;
        }
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        match iso.open_scope() {
            Ok(scope) => {
                write_out(scope_out, scope.get());
                MoorStatus::Ok as i32
            }
            Err(e) => MoorStatus::from(&e) as i32,
        }
    })
}

/// Close the innermost scope, releasing every local created in it.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_scope_close(isolate: u64, scope: u64) -> i32 {
    ffi_guard!({
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        match iso.close_scope(ScopeId(scope)) {
            Ok(()) => MoorStatus::Ok as i32,
            Err(e) => MoorStatus::from(&e) as i32,
        }
    })
}

/// Close `scope` and move the local at `slot` into the parent scope,
/// writing its new address to `slot_out`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_scope_escape(isolate: u64, scope: u64, slot: u64, slot_out: *mut u64) -> i32 {
    ffi_guard!({
        if slot_out.is_null() {
            return MoorStatus::InvalidArgument as i32;
        }
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        let scope = ScopeId(scope);
        let local = Local::new(iso.id(), scope, SlotAddr::from_raw(slot));
        match iso.escape(scope, local) {
            Ok(moved) => {
                write_out(slot_out, moved.slot().to_raw());
                MoorStatus::Ok as i32
            }
            Err(e) => MoorStatus::from(&e) as i32,
        }
    })
}

/// Add a local reference to `object` in the innermost scope.
///
/// Returns the slot and the local allocator's frontier, or
/// [`MoorSlotRef::NULL`] on failure (the fatal callback has been called
/// for usage and exhaustion errors).
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_local_new(isolate: u64, object: u64) -> MoorSlotRef {
    ffi_guard!(MoorSlotRef::NULL, {
        let (Some(iso), Some(obj)) = (get_isolate(isolate), get_object(object)) else {
            return MoorSlotRef::NULL;
        };
        match iso.add_local(&obj) {
            Ok((local, frontier)) => MoorSlotRef::new(local.slot(), frontier),
            Err(_) => MoorSlotRef::NULL,
        }
    })
}

/// Resolve the local at `slot` in `scope` and write a new object handle
/// for it. The caller releases that handle with `moor_object_release`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_local_get(isolate: u64, scope: u64, slot: u64, object_out: *mut u64) -> i32 {
    ffi_guard!({
        if object_out.is_null() {
            return MoorStatus::InvalidArgument as i32;
        }
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        let local = Local::new(iso.id(), ScopeId(scope), SlotAddr::from_raw(slot));
        let object = match iso.get_local(local) {
            Ok(o) => o,
            Err(e) => return MoorStatus::from(&e) as i32,
        };
        let Some(handle) = insert_object(object) else {
            return MoorStatus::InternalError as i32;
        };
        write_out(object_out, handle);
        MoorStatus::Ok as i32
    })
}

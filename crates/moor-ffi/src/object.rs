//! Host objects owned by C callers.
//!
//! An object handle holds no reference of its own: the object's strong and
//! weak tallies count only local and persistent slots. Releasing the
//! handle drops the C side's access, not a reference.

use std::sync::Mutex;

use moor_core::Object;

use crate::handle::HandleTable;
use crate::status::MoorStatus;
use crate::write_out;

static OBJECTS: Mutex<HandleTable<Object>> = Mutex::new(HandleTable::new());

/// Clone the object behind a handle.
pub(crate) fn get_object(handle: u64) -> Option<Object> {
    OBJECTS.lock().ok()?.get(handle).cloned()
}

/// Register `object` and return a fresh handle for it.
pub(crate) fn insert_object(object: Object) -> Option<u64> {
    Some(OBJECTS.lock().ok()?.insert(object))
}

/// Create an object carrying a `u64` payload.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_object_new(payload: u64, object_out: *mut u64) -> i32 {
    ffi_guard!({
        if object_out.is_null() {
            return MoorStatus::InvalidArgument as i32;
        }
        let handle = ffi_lock!(OBJECTS).insert(Object::new(payload));
        write_out(object_out, handle);
        MoorStatus::Ok as i32
    })
}

/// Release an object handle.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_object_release(object: u64) -> i32 {
    ffi_guard!({
        match ffi_lock!(OBJECTS).remove(object) {
            Some(_) => MoorStatus::Ok as i32,
            None => MoorStatus::InvalidHandle as i32,
        }
    })
}

/// Read the object's payload. Fails with `InvalidHandle` once destroyed.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_object_payload(object: u64, payload_out: *mut u64) -> i32 {
    ffi_guard!({
        let Some(obj) = get_object(object) else {
            return MoorStatus::InvalidHandle as i32;
        };
        let Some(payload) = obj.with_payload(|p: &u64| *p) else {
            return MoorStatus::InvalidHandle as i32;
        };
        if !write_out(payload_out, payload) {
            return MoorStatus::InvalidArgument as i32;
        }
        MoorStatus::Ok as i32
    })
}

/// Write the object's strong and weak tallies. Either pointer may be null.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_object_refcount(object: u64, strong_out: *mut u32, weak_out: *mut u32) -> i32 {
    ffi_guard!({
        let Some(obj) = get_object(object) else {
            return MoorStatus::InvalidHandle as i32;
        };
        write_out(strong_out, obj.strong_count());
        write_out(weak_out, obj.weak_count());
        MoorStatus::Ok as i32
    })
}

/// Write 1 to `out` once the object's last reference has been released.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_object_is_destroyed(object: u64, out: *mut u8) -> i32 {
    ffi_guard!({
        let Some(obj) = get_object(object) else {
            return MoorStatus::InvalidHandle as i32;
        };
        if !write_out(out, u8::from(obj.is_destroyed())) {
            return MoorStatus::InvalidArgument as i32;
        }
        MoorStatus::Ok as i32
    })
}

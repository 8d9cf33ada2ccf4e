//! C FFI bindings for the Moor handle layer.
//!
//! Isolates and host objects live in generation-checked handle tables;
//! C callers hold opaque `u64` handles. Slot addresses cross the boundary
//! as raw `u64` values (`MOOR_NULL_SLOT` for "none"). Every exported
//! function catches panics and reports them as `MOOR_STATUS_PANICKED`.
//!
//! This is the only crate in the workspace that may contain `unsafe`
//! code, confined to writes through caller-provided out-pointers.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

/// Run an FFI body, converting a caught panic into `MoorStatus::Panicked`
/// (or into the given fallback value for functions not returning a status).
macro_rules! ffi_guard {
    ($body:block) => {
        ffi_guard!($crate::status::MoorStatus::Panicked as i32, $body)
    };
    ($on_panic:expr, $body:block) => {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| $body)) {
            Ok(value) => value,
            Err(_) => {
                tracing::error!("panic caught at FFI boundary");
                $on_panic
            }
        }
    };
}

/// Lock a table mutex, returning `MoorStatus::InternalError` from the
/// enclosing FFI body if it is poisoned.
macro_rules! ffi_lock {
    ($mutex:expr) => {
        match $mutex.lock() {
            Ok(guard) => guard,
            Err(_) => return $crate::status::MoorStatus::InternalError as i32,
        }
    };
}

mod handle;
pub mod isolate;
pub mod object;
pub mod persistent;
pub mod scope;
pub mod status;
pub mod types;

pub use status::MoorStatus;
pub use types::{
    MoorFatalCallback, MoorIsolateConfig, MoorIsolateStats, MoorSlotRef, MoorSweepReport,
    MoorWeakCallback, MOOR_NULL_SLOT,
};

/// Write `value` through `out` if it is non-null. Returns `false` for null.
#[allow(unsafe_code)]
pub(crate) fn write_out<T>(out: *mut T, value: T) -> bool {
    if out.is_null() {
        return false;
    }
    // SAFETY: non-null out-pointers are valid and aligned per caller contract.
    unsafe { out.write(value) };
    true
}

//! Isolate lifecycle FFI: create, destroy, enter, exit, stats, collect.
//!
//! The global `ISOLATES` table lock is only held for handle lookup; every
//! call then works on a cloned `Arc<Isolate>`, so weak callbacks and fatal
//! callbacks never run under the table lock.

use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::{Arc, Mutex};

use moor_core::FatalErrorHandler;
use moor_isolate::{Isolate, IsolateConfig};

use crate::handle::HandleTable;
use crate::status::MoorStatus;
use crate::types::{MoorIsolateConfig, MoorIsolateStats, MoorSweepReport};
use crate::write_out;

static ISOLATES: Mutex<HandleTable<Arc<Isolate>>> = Mutex::new(HandleTable::new());

/// Clone the Arc for an isolate handle, briefly locking the global table.
///
/// Returns `None` if the handle is invalid or the mutex is poisoned.
pub(crate) fn get_isolate(handle: u64) -> Option<Arc<Isolate>> {
    ISOLATES.lock().ok()?.get(handle).cloned()
}

/// Forwards fatal errors to a C callback.
struct CFatalHandler(extern "C" fn(*const c_char, *const c_char));

impl FatalErrorHandler for CFatalHandler {
    fn signal(&self, location: &str, message: &str) {
        tracing::error!(location, message, "fatal handle error");
        let location = CString::new(location.replace('\0', " ")).unwrap_or_default();
        let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
        (self.0)(location.as_ptr(), message.as_ptr());
    }
}

fn to_config(raw: &MoorIsolateConfig) -> IsolateConfig {
    let config = IsolateConfig {
        locals: raw.locals(),
        persistents: raw.persistents(),
        ..IsolateConfig::default()
    };
    match raw.fatal {
        Some(callback) => config.with_fatal_handler(Arc::new(CFatalHandler(callback))),
        None => config,
    }
}

/// Fill `out` with the default isolate configuration.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_isolate_config_default(out: *mut MoorIsolateConfig) -> i32 {
    ffi_guard!({
        if !write_out(out, MoorIsolateConfig::default()) {
            return MoorStatus::InvalidArgument as i32;
        }
        MoorStatus::Ok as i32
    })
}

/// Create an isolate. `config` may be null for defaults.
///
/// On success, writes the isolate handle to `isolate_out`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_isolate_create(config: *const MoorIsolateConfig, isolate_out: *mut u64) -> i32 {
    ffi_guard!({
        if isolate_out.is_null() {
            return MoorStatus::InvalidArgument as i32;
        }
        let raw = if config.is_null() {
            MoorIsolateConfig::default()
        } else {
            // SAFETY: non-null config points to a valid struct per caller contract.
            unsafe { *config }
        };
        let isolate = match Isolate::new(to_config(&raw)) {
            Ok(i) => i,
            Err(e) => return MoorStatus::from(&e) as i32,
        };
        let handle = ffi_lock!(ISOLATES).insert(isolate);
        write_out(isolate_out, handle);
        MoorStatus::Ok as i32
    })
}

/// Destroy an isolate handle. Storage is released once no thread still
/// has the isolate entered.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_isolate_destroy(isolate: u64) -> i32 {
    ffi_guard!({
        match ffi_lock!(ISOLATES).remove(isolate) {
            Some(_) => MoorStatus::Ok as i32,
            None => MoorStatus::InvalidHandle as i32,
        }
    })
}

/// Enter the isolate on the calling thread. Reentrant.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_isolate_enter(isolate: u64) -> i32 {
    ffi_guard!({
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        iso.enter();
        MoorStatus::Ok as i32
    })
}

/// Undo one enter on the calling thread.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_isolate_exit(isolate: u64) -> i32 {
    ffi_guard!({
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        match iso.exit() {
            Ok(()) => MoorStatus::Ok as i32,
            Err(e) => MoorStatus::from(&e) as i32,
        }
    })
}

/// Write 1 to `out` if any thread has entered the isolate, else 0.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_isolate_contains_threads(isolate: u64, out: *mut u8) -> i32 {
    ffi_guard!({
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        if !write_out(out, u8::from(iso.contains_threads())) {
            return MoorStatus::InvalidArgument as i32;
        }
        MoorStatus::Ok as i32
    })
}

/// Write the isolate's storage counters to `out`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_isolate_stats(isolate: u64, out: *mut MoorIsolateStats) -> i32 {
    ffi_guard!({
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        if !write_out(out, MoorIsolateStats::from(iso.stats())) {
            return MoorStatus::InvalidArgument as i32;
        }
        MoorStatus::Ok as i32
    })
}

/// Run the weak sweep. `report_out` may be null.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn moor_collect(isolate: u64, report_out: *mut MoorSweepReport) -> i32 {
    ffi_guard!({
        let Some(iso) = get_isolate(isolate) else {
            return MoorStatus::InvalidHandle as i32;
        };
        let report = iso.collect_weak();
        write_out(report_out, MoorSweepReport::from(report));
        MoorStatus::Ok as i32
    })
}

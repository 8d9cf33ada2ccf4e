//! Test utilities and mock types for Moor development.
//!
//! Provides a recording [`FatalErrorHandler`], drop-probed object fixtures
//! ([`TrackedObjects`]) and a shared [`CallLog`] for asserting callback
//! order across threads.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{tracked_object, CallLog, DropCounter, TrackedObjects};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use moor_core::FatalErrorHandler;

/// Mock [`FatalErrorHandler`] that records every signal.
///
/// The engine-dead predicate can be flipped with
/// [`set_engine_dead`](RecordingFatalHandler::set_engine_dead).
#[derive(Debug, Default)]
pub struct RecordingFatalHandler {
    signals: Mutex<Vec<(String, String)>>,
    engine_dead: AtomicBool,
}

impl RecordingFatalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `engine_dead()` report `dead`.
    pub fn set_engine_dead(&self, dead: bool) {
        self.engine_dead.store(dead, Ordering::SeqCst);
    }

    /// Number of signals received.
    pub fn count(&self) -> usize {
        self.signals.lock().unwrap().len()
    }

    /// Locations of every signal, in order.
    pub fn locations(&self) -> Vec<String> {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .map(|(l, _)| l.clone())
            .collect()
    }

    /// Messages of every signal, in order.
    pub fn messages(&self) -> Vec<String> {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl FatalErrorHandler for RecordingFatalHandler {
    fn signal(&self, location: &str, message: &str) {
        self.signals
            .lock()
            .unwrap()
            .push((location.to_string(), message.to_string()));
    }

    fn engine_dead(&self) -> bool {
        self.engine_dead.load(Ordering::SeqCst)
    }
}

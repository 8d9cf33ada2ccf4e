//! C-compatible status codes.
//!
//! [`MoorStatus`] is a `repr(i32)` enum covering every failure the handle
//! layer can report. Conversions from [`HandleError`] and [`ConfigError`]
//! are provided.

use moor_core::{HandleError, UsageError};
use moor_isolate::ConfigError;

/// C-compatible status code returned by FFI functions.
///
/// `Ok` = 0, all errors are negative. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoorStatus {
    /// Success.
    Ok = 0,
    /// Isolate or object handle is invalid or was already destroyed.
    InvalidHandle = -1,
    /// A pointer argument is null or a value is out of range.
    InvalidArgument = -2,
    /// Isolate configuration failed validation.
    ConfigError = -3,
    /// A local handle was requested with no open handle scope.
    NoScope = -4,
    /// A scope was closed twice, out of order, or escaped from illegally.
    ScopeMisuse = -5,
    /// A slot address is stale, foreign, or outside storage.
    StaleHandle = -6,
    /// The calling thread has not entered the isolate or lacks its lock.
    NotEntered = -7,
    /// Slab storage could not grow.
    ResourceExhausted = -8,
    /// A fatal error was already signalled; the call did nothing.
    EngineDead = -9,
    /// Internal error (e.g. poisoned mutex after a prior panic).
    InternalError = -10,
    /// A Rust panic was caught at the FFI boundary.
    Panicked = -128,
}

impl From<&UsageError> for MoorStatus {
    fn from(e: &UsageError) -> Self {
        match e {
            UsageError::NoEnclosingScope => MoorStatus::NoScope,
            UsageError::ScopeAlreadyClosed { .. }
            | UsageError::ScopeNotInnermost { .. }
            | UsageError::EscapeWithoutParent { .. }
            | UsageError::DoubleEscape { .. }
            | UsageError::SlotOutsideScope { .. } => MoorStatus::ScopeMisuse,
            UsageError::StaleLocal { .. }
            | UsageError::InvalidAddress { .. }
            | UsageError::WrongIsolate { .. } => MoorStatus::StaleHandle,
            UsageError::NotEntered { .. } | UsageError::NotLocked { .. } => {
                MoorStatus::NotEntered
            }
        }
    }
}

impl From<&HandleError> for MoorStatus {
    fn from(e: &HandleError) -> Self {
        match e {
            HandleError::Usage(u) => MoorStatus::from(u),
            HandleError::ResourceExhausted { .. } => MoorStatus::ResourceExhausted,
            HandleError::EngineDead => MoorStatus::EngineDead,
        }
    }
}

impl From<&ConfigError> for MoorStatus {
    fn from(_e: &ConfigError) -> Self {
        MoorStatus::ConfigError
    }
}

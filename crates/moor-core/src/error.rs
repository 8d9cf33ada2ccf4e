//! Error taxonomy for the handle layer.
//!
//! Three classes of failure exist, and none of them is recoverable at the
//! point of detection:
//!
//! - [`UsageError`]: the host broke the API contract (no enclosing scope,
//!   double close, foreign address, not entered/locked).
//! - [`HandleError::ResourceExhausted`]: slab storage could not grow.
//! - [`HandleError::EngineDead`]: a fatal error was already signalled.
//!
//! Every error is reported through the isolate's
//! [`FatalErrorHandler`](crate::FatalErrorHandler) before it is returned.

use std::error::Error;
use std::fmt;

use crate::id::{IsolateId, ScopeId, SlotAddr};

/// A violation of the handle API contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UsageError {
    /// A local handle was requested with no open handle scope.
    NoEnclosingScope,
    /// The scope was already closed (double close, or escape after close).
    ScopeAlreadyClosed {
        /// The scope that was closed.
        scope: ScopeId,
    },
    /// The scope is open but a more recently opened scope is still open.
    ScopeNotInnermost {
        /// The scope that was presented.
        scope: ScopeId,
        /// The scope currently on top of the stack.
        innermost: ScopeId,
    },
    /// An escape was attempted from the outermost scope.
    EscapeWithoutParent {
        /// The outermost scope.
        scope: ScopeId,
    },
    /// The slot was already escaped (its value was moved out).
    DoubleEscape {
        /// The emptied slot.
        slot: SlotAddr,
    },
    /// The slot does not belong to the scope it was presented with.
    SlotOutsideScope {
        /// The slot presented.
        slot: SlotAddr,
        /// The scope it was expected to belong to.
        scope: ScopeId,
    },
    /// A local handle outlived the scope that created it.
    StaleLocal {
        /// The scope the handle was created in.
        scope: ScopeId,
    },
    /// The address falls in no allocated storage.
    InvalidAddress {
        /// The offending address.
        slot: SlotAddr,
    },
    /// The calling thread has not entered the isolate.
    NotEntered {
        /// The isolate that was not entered.
        isolate: IsolateId,
    },
    /// The isolate is in locking mode and the calling thread does not hold
    /// its lock.
    NotLocked {
        /// The isolate whose lock is required.
        isolate: IsolateId,
    },
    /// A handle created in one isolate was presented to another.
    WrongIsolate {
        /// The isolate the handle belongs to.
        expected: IsolateId,
        /// The isolate it was presented to.
        actual: IsolateId,
    },
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEnclosingScope => write!(f, "cannot create a local handle without a handle scope"),
            Self::ScopeAlreadyClosed { scope } => write!(f, "handle scope {scope} is already closed"),
            Self::ScopeNotInnermost { scope, innermost } => {
                write!(
                    f,
                    "handle scope {scope} is not innermost (scope {innermost} is still open)"
                )
            }
            Self::EscapeWithoutParent { scope } => {
                write!(f, "cannot escape from outermost handle scope {scope}")
            }
            Self::DoubleEscape { slot } => write!(f, "slot {slot} was already escaped"),
            Self::SlotOutsideScope { slot, scope } => {
                write!(f, "slot {slot} does not belong to handle scope {scope}")
            }
            Self::StaleLocal { scope } => {
                write!(f, "local handle used after its scope {scope} closed")
            }
            Self::InvalidAddress { slot } => {
                write!(f, "address {slot} is not in any allocated slab")
            }
            Self::NotEntered { isolate } => {
                write!(f, "thread has not entered isolate {isolate}")
            }
            Self::NotLocked { isolate } => {
                write!(f, "thread does not hold the lock of isolate {isolate}")
            }
            Self::WrongIsolate { expected, actual } => {
                write!(
                    f,
                    "handle belongs to isolate {expected} but was used with isolate {actual}"
                )
            }
        }
    }
}

impl Error for UsageError {}

/// Errors returned by handle operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandleError {
    /// The host broke the API contract.
    Usage(UsageError),
    /// Slab storage could not grow.
    ResourceExhausted {
        /// Slab count at the time of failure.
        slabs: usize,
        /// Configured slab limit.
        max_slabs: usize,
    },
    /// The engine already signalled a fatal error.
    EngineDead,
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(e) => write!(f, "usage error: {e}"),
            Self::ResourceExhausted { slabs, max_slabs } => {
                write!(f, "slab storage exhausted: {slabs} of {max_slabs} slabs in use")
            }
            Self::EngineDead => write!(f, "engine is dead"),
        }
    }
}

impl Error for HandleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Usage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<UsageError> for HandleError {
    fn from(e: UsageError) -> Self {
        Self::Usage(e)
    }
}

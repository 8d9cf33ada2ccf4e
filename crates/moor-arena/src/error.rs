//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use moor_core::{HandleError, SlotAddr, UsageError};

/// Errors that can occur during slab allocator operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The slab limit is reached and the last slab is full.
    CapacityExceeded {
        /// Slabs currently allocated.
        slabs: usize,
        /// Configured limit.
        max_slabs: usize,
    },
    /// A delete target or slot lookup that falls in no allocated slab.
    AddressOutOfRange {
        /// The offending address.
        addr: SlotAddr,
    },
    /// An [`ArenaConfig`](crate::ArenaConfig) failed validation.
    InvalidConfig {
        /// Description of the violated invariant.
        reason: String,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded { slabs, max_slabs } => {
                write!(f, "slab capacity exceeded: {slabs} of {max_slabs} slabs in use")
            }
            Self::AddressOutOfRange { addr } => {
                write!(f, "address {addr} is outside every allocated slab")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid arena config: {reason}"),
        }
    }
}

impl Error for ArenaError {}

impl From<ArenaError> for HandleError {
    fn from(e: ArenaError) -> Self {
        match e {
            ArenaError::CapacityExceeded { slabs, max_slabs } => {
                HandleError::ResourceExhausted { slabs, max_slabs }
            }
            ArenaError::AddressOutOfRange { addr } => {
                HandleError::Usage(UsageError::InvalidAddress { slot: addr })
            }
            // Configs are validated before any allocator exists.
            ArenaError::InvalidConfig { .. } => HandleError::EngineDead,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_maps_to_exhaustion() {
        let err = HandleError::from(ArenaError::CapacityExceeded {
            slabs: 2,
            max_slabs: 2,
        });
        assert_eq!(
            err,
            HandleError::ResourceExhausted {
                slabs: 2,
                max_slabs: 2
            }
        );
    }

    #[test]
    fn out_of_range_maps_to_usage_error() {
        let addr = SlotAddr::new(9, 0);
        let err = HandleError::from(ArenaError::AddressOutOfRange { addr });
        assert_eq!(
            err,
            HandleError::Usage(UsageError::InvalidAddress { slot: addr })
        );
    }
}

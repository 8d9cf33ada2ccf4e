//! Slab allocator configuration parameters.

use crate::error::ArenaError;
use crate::slab::Slot;

/// Configuration for a [`SlabAllocator`](crate::SlabAllocator).
///
/// Controls slab sizing and the growth limit. Validated at construction;
/// all values are immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Number of reference slots per slab.
    ///
    /// Default: 1024. Must be at least 1 and below `u32::MAX` (the top
    /// value is reserved for the null address).
    pub slab_size: u32,

    /// Maximum number of slabs the allocator may hold at once.
    ///
    /// Default: 65_536, i.e. 64M slots at the default slab size. Exceeding
    /// it is resource exhaustion.
    pub max_slabs: u32,
}

impl ArenaConfig {
    /// Default slab size in slots.
    pub const DEFAULT_SLAB_SIZE: u32 = 1024;

    /// Default maximum slab count.
    pub const DEFAULT_MAX_SLABS: u32 = 65_536;

    /// Create a config with the given slab size and the default slab limit.
    pub fn new(slab_size: u32) -> Self {
        Self {
            slab_size,
            max_slabs: Self::DEFAULT_MAX_SLABS,
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.slab_size == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "slab_size must be at least 1".into(),
            });
        }
        if self.slab_size == u32::MAX {
            return Err(ArenaError::InvalidConfig {
                reason: "slab_size must be below u32::MAX".into(),
            });
        }
        if self.max_slabs == 0 || self.max_slabs == u32::MAX {
            return Err(ArenaError::InvalidConfig {
                reason: format!("max_slabs {} out of range", self.max_slabs),
            });
        }
        Ok(())
    }

    /// Size of one slab's slot array in bytes.
    pub fn slab_bytes(&self) -> usize {
        self.slab_size as usize * std::mem::size_of::<Slot>()
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SLAB_SIZE)
    }
}

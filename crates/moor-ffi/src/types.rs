//! C-compatible value types.

use std::os::raw::c_char;

use moor_arena::{ArenaConfig, Frontier};
use moor_core::SlotAddr;
use moor_isolate::{IsolateStats, SweepReport};

/// Address of the null slot (`UINT64_MAX`).
pub const MOOR_NULL_SLOT: u64 = u64::MAX;

/// Result of adding a local: the written slot plus the allocator frontier,
/// so callers can bump-allocate without another call.
///
/// On failure every field is [`MOOR_NULL_SLOT`].
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoorSlotRef {
    /// Address of the written slot.
    pub slot: u64,
    /// Next free slot of the current slab.
    pub next_free: u64,
    /// One past the last slot of the current slab.
    pub limit: u64,
}

impl MoorSlotRef {
    /// The failure value.
    pub const NULL: MoorSlotRef = MoorSlotRef {
        slot: MOOR_NULL_SLOT,
        next_free: MOOR_NULL_SLOT,
        limit: MOOR_NULL_SLOT,
    };

    pub(crate) fn new(slot: SlotAddr, frontier: Frontier) -> Self {
        Self {
            slot: slot.to_raw(),
            next_free: frontier.next_free.to_raw(),
            limit: frontier.limit.to_raw(),
        }
    }
}

/// Receives fatal errors: `location` and `message` are NUL-terminated and
/// valid only for the duration of the call.
pub type MoorFatalCallback = Option<extern "C" fn(location: *const c_char, message: *const c_char)>;

/// Weak callback: return non-zero to revive the handle.
pub type MoorWeakCallback = Option<extern "C" fn(slot: u64, param: usize) -> i32>;

/// Isolate construction parameters. Zero slab fields select the defaults.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct MoorIsolateConfig {
    /// Slots per local-handle slab.
    pub local_slab_size: u32,
    /// Maximum local-handle slabs per thread.
    pub local_max_slabs: u32,
    /// Slots per persistent-handle slab.
    pub persistent_slab_size: u32,
    /// Maximum persistent-handle slabs.
    pub persistent_max_slabs: u32,
    /// Optional fatal-error callback; null logs only.
    pub fatal: MoorFatalCallback,
}

impl Default for MoorIsolateConfig {
    fn default() -> Self {
        Self {
            local_slab_size: ArenaConfig::DEFAULT_SLAB_SIZE,
            local_max_slabs: ArenaConfig::DEFAULT_MAX_SLABS,
            persistent_slab_size: ArenaConfig::DEFAULT_SLAB_SIZE,
            persistent_max_slabs: ArenaConfig::DEFAULT_MAX_SLABS,
            fatal: None,
        }
    }
}

fn or_default(value: u32, default: u32) -> u32 {
    if value == 0 {
        default
    } else {
        value
    }
}

impl MoorIsolateConfig {
    pub(crate) fn locals(&self) -> ArenaConfig {
        ArenaConfig {
            slab_size: or_default(self.local_slab_size, ArenaConfig::DEFAULT_SLAB_SIZE),
            max_slabs: or_default(self.local_max_slabs, ArenaConfig::DEFAULT_MAX_SLABS),
        }
    }

    pub(crate) fn persistents(&self) -> ArenaConfig {
        ArenaConfig {
            slab_size: or_default(self.persistent_slab_size, ArenaConfig::DEFAULT_SLAB_SIZE),
            max_slabs: or_default(self.persistent_max_slabs, ArenaConfig::DEFAULT_MAX_SLABS),
        }
    }
}

/// Counters from one weak sweep.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MoorSweepReport {
    /// Weak callbacks invoked.
    pub invoked: u64,
    /// Callbacks that revived their handle.
    pub revived: u64,
    /// Weak handles zeroed.
    pub cleared: u64,
    /// Objects destroyed.
    pub destroyed: u64,
}

impl From<SweepReport> for MoorSweepReport {
    fn from(r: SweepReport) -> Self {
        Self {
            invoked: r.invoked as u64,
            revived: r.revived as u64,
            cleared: r.cleared as u64,
            destroyed: r.destroyed as u64,
        }
    }
}

/// Isolate storage counters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MoorIsolateStats {
    /// Local slots across all threads.
    pub local_slots: u64,
    /// Open handle scopes across all threads.
    pub open_scopes: u64,
    /// Occupied persistent slots.
    pub persistents: u64,
    /// Weak persistent slots.
    pub weak: u64,
    /// Threads holding live locals.
    pub rooting_threads: u64,
    /// Threads entered into the isolate.
    pub entered_threads: u64,
}

impl From<IsolateStats> for MoorIsolateStats {
    fn from(s: IsolateStats) -> Self {
        Self {
            local_slots: s.local_slots as u64,
            open_scopes: s.open_scopes as u64,
            persistents: s.persistents as u64,
            weak: s.weak as u64,
            rooting_threads: s.rooting_threads as u64,
            entered_threads: s.entered_threads as u64,
        }
    }
}

//! Allocation frontiers, add results, and checkpoints.
//!
//! A [`Frontier`] is the pair of addresses callers need to bump-allocate
//! without asking the allocator again: the next free slot and the end of
//! the current slab. When `next_free == limit` the slab is full and the
//! next add starts a new slab.

use std::fmt;

use moor_core::SlotAddr;

/// The allocator's current fill position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Frontier {
    /// Address the next add will write (within the current slab).
    pub next_free: SlotAddr,
    /// One past the last usable slot of the current slab.
    pub limit: SlotAddr,
}

impl Frontier {
    /// Frontier of an allocator with no slabs.
    pub const EMPTY: Frontier = Frontier {
        next_free: SlotAddr::new(0, 0),
        limit: SlotAddr::new(0, 0),
    };

    /// Whether the next add must allocate a new slab.
    pub fn is_full(&self) -> bool {
        self.next_free == self.limit
    }
}

impl fmt::Display for Frontier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.next_free, self.limit)
    }
}

/// Returned by every successful add: the written slot and the updated
/// frontier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub struct AddResult {
    /// Address of the slot just written.
    pub slot: SlotAddr,
    /// Frontier after the write.
    pub frontier: Frontier,
}

/// A frontier snapshot taken at scope entry.
///
/// Deleting back to `next_free` restores the allocator to exactly the
/// state it had when the checkpoint was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Checkpoint {
    frontier: Frontier,
}

impl Checkpoint {
    pub(crate) fn new(frontier: Frontier) -> Self {
        Self { frontier }
    }

    /// The address the allocator must end at to restore this checkpoint.
    pub fn next_free(&self) -> SlotAddr {
        self.frontier.next_free
    }

    /// The frontier captured.
    pub fn frontier(&self) -> Frontier {
        self.frontier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frontier_is_full() {
        assert!(Frontier::EMPTY.is_full());
    }

    #[test]
    fn partial_frontier_is_not_full() {
        let f = Frontier {
            next_free: SlotAddr::new(0, 2),
            limit: SlotAddr::new(0, 4),
        };
        assert!(!f.is_full());
        assert_eq!(f.to_string(), "[0:2..0:4)");
    }
}

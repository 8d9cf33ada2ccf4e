//! The slab allocator: append, truncate-to-address, traverse.
//!
//! [`SlabAllocator`] is an ordered list of [`Slab`]s. Every slab except the
//! last is full, and the last is never empty, so occupancy is
//! `slab_size * (slab_count - 1) + last_len` and the frontier is always the
//! first free slot of the last slab.

use moor_core::{Object, RefKind, SlotAddr};

use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::frontier::{AddResult, Checkpoint, Frontier};
use crate::slab::{Slab, Slot};

/// Append-only chunked storage of reference slots.
///
/// Owns its slabs and, transitively, one reference per occupied slot.
/// Dropping the allocator releases every reference it still holds.
#[derive(Debug)]
pub struct SlabAllocator {
    slabs: Vec<Slab>,
    slab_size: u32,
    max_slabs: u32,
}

impl SlabAllocator {
    /// Create an empty allocator. No slab is allocated until the first add.
    pub fn new(config: &ArenaConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        Ok(Self {
            slabs: Vec::new(),
            slab_size: config.slab_size,
            max_slabs: config.max_slabs,
        })
    }

    /// Append `object` as a strong reference, retaining it once.
    pub fn add(&mut self, object: &Object) -> Result<AddResult, ArenaError> {
        self.reserve()?;
        object.retain(RefKind::Strong);
        Ok(self.push(Slot::occupied(object.clone(), RefKind::Strong)))
    }

    /// Append a strong reference the caller already counted.
    ///
    /// On failure the reference is released, since nothing else owns it.
    pub fn adopt(&mut self, object: Object) -> Result<AddResult, ArenaError> {
        if let Err(e) = self.reserve() {
            object.release(RefKind::Strong);
            return Err(e);
        }
        Ok(self.push(Slot::occupied(object, RefKind::Strong)))
    }

    /// Truncate storage so it ends exactly at `desired`.
    ///
    /// - `None` deletes everything.
    /// - The current frontier is a no-op.
    /// - An occupied slot's address deletes that slot and everything after
    ///   it; the start of a slab deletes that whole slab and its successors.
    ///
    /// Each removed reference is released with the kind it was held as.
    /// Returns the number of slots removed.
    pub fn delete(&mut self, desired: Option<SlotAddr>) -> Result<usize, ArenaError> {
        let Some(addr) = desired else {
            return Ok(self.clear());
        };
        if addr == self.frontier().next_free {
            return Ok(0);
        }
        let addr = self.normalize(addr);
        let index = addr.slab() as usize;
        let within = self
            .slabs
            .get(index)
            .is_some_and(|slab| addr.offset() < slab.len());
        if !within {
            return Err(ArenaError::AddressOutOfRange { addr });
        }

        let mut removed = 0;
        while self.slabs.len() > index + 1 {
            if let Some(mut slab) = self.slabs.pop() {
                removed += slab.truncate(0);
            }
        }
        if let Some(slab) = self.slabs.last_mut() {
            removed += slab.truncate(addr.offset());
            if slab.is_empty() {
                self.slabs.pop();
            }
        }
        Ok(removed)
    }

    /// Delete everything. Returns the number of slots removed.
    pub fn clear(&mut self) -> usize {
        let mut removed = 0;
        while let Some(mut slab) = self.slabs.pop() {
            removed += slab.truncate(0);
        }
        removed
    }

    /// Number of occupied slots (nulled slots included).
    pub fn number_of_items(&self) -> usize {
        match self.slabs.last() {
            None => 0,
            Some(last) => {
                self.slab_size as usize * (self.slabs.len() - 1) + last.len() as usize
            }
        }
    }

    /// Visit every slot in slab order, then intra-slab order.
    pub fn iterate(&self, mut visit: impl FnMut(SlotAddr, &Slot)) {
        for (s, slab) in self.slabs.iter().enumerate() {
            for (o, slot) in slab.slots().iter().enumerate() {
                visit(SlotAddr::new(s as u32, o as u32), slot);
            }
        }
    }

    /// Visit every slot mutably. The visitor may null or re-kind the slot
    /// it is given; the collection itself cannot change during the walk.
    pub fn iterate_mut(&mut self, mut visit: impl FnMut(SlotAddr, &mut Slot)) {
        for (s, slab) in self.slabs.iter_mut().enumerate() {
            for (o, slot) in slab.slots_mut().iter_mut().enumerate() {
                visit(SlotAddr::new(s as u32, o as u32), slot);
            }
        }
    }

    /// The slot at `addr`, if it is occupied storage.
    pub fn get(&self, addr: SlotAddr) -> Option<&Slot> {
        self.slabs.get(addr.slab() as usize)?.get(addr.offset())
    }

    /// The mutable slot at `addr`, if it is occupied storage.
    pub fn get_mut(&mut self, addr: SlotAddr) -> Option<&mut Slot> {
        self.slabs.get_mut(addr.slab() as usize)?.get_mut(addr.offset())
    }

    /// Current fill position.
    pub fn frontier(&self) -> Frontier {
        match self.slabs.last() {
            None => Frontier::EMPTY,
            Some(last) => {
                let s = (self.slabs.len() - 1) as u32;
                Frontier {
                    next_free: SlotAddr::new(s, last.len()),
                    limit: SlotAddr::new(s, self.slab_size),
                }
            }
        }
    }

    /// Snapshot the frontier for a later [`delete`](Self::delete).
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(self.frontier())
    }

    /// Number of allocated slabs.
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    /// Configured slots per slab.
    pub fn slab_size(&self) -> u32 {
        self.slab_size
    }

    /// Whether no slab is allocated.
    pub fn is_empty(&self) -> bool {
        self.slabs.is_empty()
    }

    /// Memory usage of all slabs in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.slabs.iter().map(Slab::memory_bytes).sum()
    }

    /// Make room for one slot, starting a new slab if needed.
    fn reserve(&mut self) -> Result<(), ArenaError> {
        let full = self.slabs.last().map_or(true, Slab::is_full);
        if !full {
            return Ok(());
        }
        if self.slabs.len() >= self.max_slabs as usize {
            return Err(ArenaError::CapacityExceeded {
                slabs: self.slabs.len(),
                max_slabs: self.max_slabs as usize,
            });
        }
        self.slabs.push(Slab::new(self.slab_size));
        Ok(())
    }

    /// Write into the last slab. `reserve` must have succeeded.
    fn push(&mut self, slot: Slot) -> AddResult {
        let s = self.slabs.len().saturating_sub(1);
        let offset = match self.slabs.last_mut().map(|slab| slab.push(slot)) {
            Some(Ok(offset)) => offset,
            _ => unreachable!("reserve() guarantees a slab with a free slot"),
        };
        AddResult {
            slot: SlotAddr::new(s as u32, offset),
            frontier: self.frontier(),
        }
    }

    /// Map a slab's limit address to the start of the following slab.
    fn normalize(&self, addr: SlotAddr) -> SlotAddr {
        if addr.offset() == self.slab_size {
            SlotAddr::new(addr.slab().wrapping_add(1), 0)
        } else {
            addr
        }
    }
}

impl Drop for SlabAllocator {
    fn drop(&mut self) {
        self.clear();
    }
}

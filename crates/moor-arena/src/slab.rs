//! Reference slots and fixed-capacity slabs.
//!
//! A [`Slab`] is a contiguous run of [`Slot`]s allocated to full capacity
//! at creation. Slots are pushed at the end and removed only by truncation,
//! so the backing `Vec` never reallocates and slot addresses are stable.

use moor_core::{Object, RefKind};

/// One storage cell: an owning reference (or null) and the tally it is
/// accounted against.
#[derive(Debug)]
pub struct Slot {
    object: Option<Object>,
    kind: RefKind,
}

impl Slot {
    /// A slot that owns an already-counted reference of `kind`.
    pub(crate) fn occupied(object: Object, kind: RefKind) -> Self {
        Self {
            object: Some(object),
            kind,
        }
    }

    /// The referenced object, or `None` if the slot was nulled.
    pub fn object(&self) -> Option<&Object> {
        self.object.as_ref()
    }

    /// The tally this slot's reference is counted against.
    pub fn kind(&self) -> RefKind {
        self.kind
    }

    /// Whether the slot holds no reference.
    pub fn is_empty(&self) -> bool {
        self.object.is_none()
    }

    /// Null the slot and hand its counted reference to the caller.
    ///
    /// The reference is not released: whoever receives it owns the count
    /// (this is how an escaped handle moves between scopes).
    pub fn take(&mut self) -> Option<Object> {
        self.object.take()
    }

    /// Null the slot and release its reference.
    ///
    /// The slot is emptied before the release runs, so a destroyed object
    /// is never reachable through it. Returns `true` if the object was
    /// destroyed.
    pub fn release(&mut self) -> bool {
        match self.object.take() {
            Some(object) => object.release(self.kind),
            None => false,
        }
    }

    /// Re-account the reference against the weak tally.
    pub fn make_weak(&mut self) {
        if self.kind == RefKind::Strong {
            if let Some(object) = &self.object {
                object.weaken();
            }
            self.kind = RefKind::Weak;
        }
    }

    /// Re-account the reference against the strong tally.
    pub fn make_strong(&mut self) {
        if self.kind == RefKind::Weak {
            if let Some(object) = &self.object {
                object.strengthen();
            }
            self.kind = RefKind::Strong;
        }
    }
}

/// A fixed-capacity contiguous block of slots.
#[derive(Debug)]
pub struct Slab {
    /// Backing storage. Allocated to full capacity at creation.
    slots: Vec<Slot>,
    /// Slot limit; `slots` never grows past it, so it never reallocates.
    capacity: u32,
}

impl Slab {
    /// Create an empty slab with room for `capacity` slots.
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: Vec::with_capacity(capacity as usize),
            capacity,
        }
    }

    /// Append a slot. Returns its offset, or hands the slot back if full.
    pub fn push(&mut self, slot: Slot) -> Result<u32, Slot> {
        if self.is_full() {
            return Err(slot);
        }
        let offset = self.slots.len() as u32;
        self.slots.push(slot);
        Ok(offset)
    }

    /// Slot at `offset`, if occupied.
    pub fn get(&self, offset: u32) -> Option<&Slot> {
        self.slots.get(offset as usize)
    }

    /// Mutable slot at `offset`, if occupied.
    pub fn get_mut(&mut self, offset: u32) -> Option<&mut Slot> {
        self.slots.get_mut(offset as usize)
    }

    /// Remove every slot at or after `offset`, releasing each reference.
    ///
    /// Returns the number of slots removed.
    pub fn truncate(&mut self, offset: u32) -> usize {
        let mut removed = 0;
        while self.slots.len() > offset as usize {
            if let Some(mut slot) = self.slots.pop() {
                slot.release();
                removed += 1;
            }
        }
        removed
    }

    /// Occupied slots, in order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Occupied slots, mutable. The slice length cannot change.
    pub fn slots_mut(&mut self) -> &mut [Slot] {
        &mut self.slots
    }

    /// Number of occupied slots.
    pub fn len(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total capacity in slots.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Whether every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity as usize
    }

    /// Memory usage of the backing storage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.capacity as usize * std::mem::size_of::<Slot>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counted(obj: &Object) -> Slot {
        obj.retain(RefKind::Strong);
        Slot::occupied(obj.clone(), RefKind::Strong)
    }

    #[test]
    fn push_until_full() {
        let obj = Object::new(());
        let mut slab = Slab::new(2);
        assert_eq!(slab.push(counted(&obj)).ok(), Some(0));
        assert_eq!(slab.push(counted(&obj)).ok(), Some(1));
        assert!(slab.is_full());
        let rejected = slab.push(Slot::occupied(obj.clone(), RefKind::Strong));
        assert!(rejected.is_err());
        assert_eq!(obj.strong_count(), 2);
    }

    #[test]
    fn truncate_releases_removed_slots() {
        let a = Object::new(());
        let b = Object::new(());
        let mut slab = Slab::new(4);
        slab.push(counted(&a)).unwrap();
        slab.push(counted(&b)).unwrap();
        slab.push(counted(&b)).unwrap();
        assert_eq!(slab.truncate(1), 2);
        assert_eq!(slab.len(), 1);
        assert!(b.is_destroyed());
        assert_eq!(a.strong_count(), 1);
    }

    #[test]
    fn capacity_is_fixed() {
        let slab = Slab::new(16);
        assert_eq!(slab.capacity(), 16);
        assert!(slab.is_empty());
    }

    #[test]
    fn take_moves_count_out() {
        let obj = Object::new(());
        let mut slot = counted(&obj);
        let moved = slot.take().unwrap();
        assert!(slot.is_empty());
        assert_eq!(moved.strong_count(), 1);
        assert!(!slot.release());
        assert_eq!(obj.strong_count(), 1);
    }

    #[test]
    fn release_on_weak_slot_hits_weak_tally() {
        let obj = Object::new(());
        obj.retain(RefKind::Strong);
        let mut strong = Slot::occupied(obj.clone(), RefKind::Strong);
        let mut weak = counted(&obj);
        weak.make_weak();
        assert_eq!((obj.strong_count(), obj.weak_count()), (1, 1));
        assert!(!weak.release());
        assert_eq!((obj.strong_count(), obj.weak_count()), (1, 0));
        assert!(strong.release());
    }

    #[test]
    fn make_strong_reverses_make_weak() {
        let obj = Object::new(());
        let mut slot = counted(&obj);
        slot.make_weak();
        slot.make_weak();
        assert_eq!(obj.weak_count(), 1);
        slot.make_strong();
        assert_eq!((obj.strong_count(), obj.weak_count()), (1, 0));
        assert_eq!(slot.kind(), RefKind::Strong);
    }
}

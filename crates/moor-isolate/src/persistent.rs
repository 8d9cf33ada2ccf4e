//! Persistent handle storage, weak references, and the weak sweep.
//!
//! A persistent slot outlives every handle scope. Making it weak moves its
//! reference from the object's strong tally to the weak tally and records
//! a callback in a side table keyed by [`SlotAddr`]. The engine collector
//! calls [`PersistentStore::sweep`] at a safepoint to run the callbacks of
//! objects only weak slots still reach.

use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

use moor_arena::{ArenaConfig, ArenaError, SlabAllocator, Slot};
use moor_core::{Object, ObjectId, RefKind, SlotAddr, UsageError};

/// Opaque embedder value handed back to a weak callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WeakParam(pub usize);

/// What a weak callback decided for its own slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeakOutcome {
    /// Let the slot go: it is zeroed and its weak reference released.
    Release,
    /// Keep the slot, re-strengthened. The object survives the sweep.
    Revive,
}

/// Arguments passed to a weak callback.
#[derive(Debug)]
pub struct WeakCallbackInfo<'a> {
    /// The weak persistent slot being processed.
    pub slot: SlotAddr,
    /// The near-death object.
    pub object: &'a Object,
    /// The parameter supplied to `make_weak`.
    pub param: WeakParam,
}

/// Weak callback. Runs during a sweep with the isolate's heap mutex held;
/// it must not call back into the isolate.
pub type WeakCallback = Box<dyn FnMut(&WeakCallbackInfo<'_>) -> WeakOutcome + Send>;

struct WeakRecord {
    param: WeakParam,
    callback: WeakCallback,
}

impl fmt::Debug for WeakRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRecord")
            .field("param", &self.param)
            .finish_non_exhaustive()
    }
}

/// Counters from one [`PersistentStore::sweep`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Weak callbacks invoked.
    pub invoked: usize,
    /// Callbacks that revived their slot.
    pub revived: usize,
    /// Weak slots zeroed.
    pub cleared: usize,
    /// Objects destroyed by the sweep.
    pub destroyed: usize,
}

/// Isolate-wide storage of persistent handles.
#[derive(Debug)]
pub struct PersistentStore {
    slots: SlabAllocator,
    weak: IndexMap<SlotAddr, WeakRecord>,
    live: usize,
}

impl PersistentStore {
    /// Create an empty store.
    pub fn new(config: &ArenaConfig) -> Result<Self, ArenaError> {
        Ok(Self {
            slots: SlabAllocator::new(config)?,
            weak: IndexMap::new(),
            live: 0,
        })
    }

    /// Store a new strong reference to `object`, retaining it once.
    ///
    /// Storage is append-only: a zeroed slot is never handed out again, so
    /// a stale handle to it can only ever see an empty slot.
    pub fn make_persistent(&mut self, object: &Object) -> Result<SlotAddr, ArenaError> {
        let added = self.slots.add(object)?;
        self.live += 1;
        Ok(added.slot)
    }

    /// Release the slot's reference (with the kind it is held as), zero it
    /// and drop any weak metadata.
    ///
    /// A slot already zeroed by a weak death is tolerated. Returns `true`
    /// if the object was destroyed.
    pub fn delete_persistent(&mut self, addr: SlotAddr) -> Result<bool, UsageError> {
        let slot = self
            .slots
            .get_mut(addr)
            .ok_or(UsageError::InvalidAddress { slot: addr })?;
        if slot.is_empty() {
            self.weak.swap_remove(&addr);
            return Ok(false);
        }
        let destroyed = slot.release();
        self.weak.swap_remove(&addr);
        self.live -= 1;
        Ok(destroyed)
    }

    /// Move the slot's reference to the weak tally and attach `callback`.
    ///
    /// Re-weakening replaces the previous callback. A zeroed slot is left
    /// untouched.
    pub fn make_weak(
        &mut self,
        addr: SlotAddr,
        param: WeakParam,
        callback: WeakCallback,
    ) -> Result<(), UsageError> {
        let slot = self
            .slots
            .get_mut(addr)
            .ok_or(UsageError::InvalidAddress { slot: addr })?;
        if slot.is_empty() {
            return Ok(());
        }
        slot.make_weak();
        self.weak.insert(addr, WeakRecord { param, callback });
        Ok(())
    }

    /// Move the slot's reference back to the strong tally and drop its
    /// weak metadata.
    pub fn clear_weakness(&mut self, addr: SlotAddr) -> Result<(), UsageError> {
        let slot = self
            .slots
            .get_mut(addr)
            .ok_or(UsageError::InvalidAddress { slot: addr })?;
        slot.make_strong();
        self.weak.swap_remove(&addr);
        Ok(())
    }

    /// Whether the slot holds a weak reference.
    pub fn is_weak(&self, addr: SlotAddr) -> bool {
        self.slots
            .get(addr)
            .is_some_and(|slot| !slot.is_empty() && slot.kind() == RefKind::Weak)
    }

    /// Whether the slot is weak and its object has no strong referrers.
    pub fn is_near_death(&self, addr: SlotAddr) -> bool {
        self.is_weak(addr)
            && self
                .slots
                .get(addr)
                .and_then(Slot::object)
                .is_some_and(|object| object.strong_count() == 0)
    }

    /// The object referenced by the slot, if any.
    pub fn get(&self, addr: SlotAddr) -> Option<&Object> {
        self.slots.get(addr).and_then(Slot::object)
    }

    /// Occupied persistent slots.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no persistent slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Slots carrying weak metadata.
    pub fn weak_count(&self) -> usize {
        self.weak.len()
    }

    /// Visit every strong persistent reference in layout order.
    pub fn iterate_strong(&self, mut visit: impl FnMut(SlotAddr, &Object)) {
        self.slots.iterate(|addr, slot| {
            if slot.kind() == RefKind::Strong {
                if let Some(object) = slot.object() {
                    visit(addr, object);
                }
            }
        });
    }

    /// Process every object that only weak slots still reach.
    ///
    /// Every callback of such an object runs, in slot order, whatever its
    /// siblings decided. A reviving callback re-strengthens its own slot.
    /// Every other slot of the object is zeroed, then its weak reference
    /// released; the object is destroyed when its last reference goes, so
    /// no zeroed slot can observe a destroyed object.
    pub fn sweep(&mut self) -> SweepReport {
        let mut doomed: IndexMap<ObjectId, (Object, SmallVec<[SlotAddr; 4]>)> = IndexMap::new();
        self.slots.iterate(|addr, slot| {
            if slot.kind() != RefKind::Weak {
                return;
            }
            if let Some(object) = slot.object() {
                if object.strong_count() == 0 {
                    doomed
                        .entry(object.id())
                        .or_insert_with(|| (object.clone(), SmallVec::new()))
                        .1
                        .push(addr);
                }
            }
        });

        let mut report = SweepReport::default();
        for (_, (object, addrs)) in doomed {
            let mut releasing: SmallVec<[SlotAddr; 4]> = SmallVec::new();
            for addr in addrs {
                let Some(record) = self.weak.get_mut(&addr) else {
                    releasing.push(addr);
                    continue;
                };
                let info = WeakCallbackInfo {
                    slot: addr,
                    object: &object,
                    param: record.param,
                };
                let outcome = (record.callback)(&info);
                report.invoked += 1;
                match outcome {
                    WeakOutcome::Revive => {
                        report.revived += 1;
                        self.weak.swap_remove(&addr);
                        if let Some(slot) = self.slots.get_mut(addr) {
                            slot.make_strong();
                        }
                    }
                    WeakOutcome::Release => releasing.push(addr),
                }
            }

            for addr in releasing {
                self.weak.swap_remove(&addr);
                let Some(slot) = self.slots.get_mut(addr) else {
                    continue;
                };
                if slot.release() {
                    report.destroyed += 1;
                }
                report.cleared += 1;
                self.live -= 1;
            }
        }
        report
    }
}

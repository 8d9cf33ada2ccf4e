//! Strongly-typed identifiers and the [`SlotAddr`] slot address.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// Counter for unique [`ObjectId`] allocation.
static OBJECT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Counter for unique [`IsolateId`] allocation.
static ISOLATE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Counter for unique [`ScopeId`] allocation.
static SCOPE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-object identifier.
///
/// Allocated from a monotonic atomic counter. Used to group the weak slots
/// that point at the same object during a sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate a fresh, unique object ID. Thread-safe.
    pub fn next() -> Self {
        Self(OBJECT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique per-isolate identifier.
///
/// Two isolates never share an ID within a process, so a handle carrying an
/// `IsolateId` can be checked against the isolate it is presented to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IsolateId(u64);

impl IsolateId {
    /// Allocate a fresh, unique isolate ID. Thread-safe.
    pub fn next() -> Self {
        Self(ISOLATE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IsolateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one handle scope.
///
/// Unique process-wide, so a local handle presented on a thread whose scope
/// stack never issued its scope is detected rather than aliased.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u64);

impl ScopeId {
    /// Allocate a fresh, unique scope ID. Thread-safe.
    pub fn next() -> Self {
        Self(SCOPE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ScopeId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identity of an OS thread, used as the key for per-thread bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadKey(ThreadId);

impl ThreadKey {
    /// The calling thread's key.
    pub fn current() -> Self {
        Self(thread::current().id())
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Address of a single reference slot inside a slab allocator.
///
/// Encoding: upper 32 bits = slab ordinal, lower 32 bits = offset inside
/// the slab. Addresses order the same way slots are laid out, so "at or
/// after a checkpoint" is a plain comparison. [`SlotAddr::NULL`] (all ones)
/// is never produced by an allocator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotAddr(u64);

impl SlotAddr {
    /// The distinguished "no slot" address.
    pub const NULL: SlotAddr = SlotAddr(u64::MAX);

    /// Build an address from a slab ordinal and an offset within it.
    pub const fn new(slab: u32, offset: u32) -> Self {
        Self(((slab as u64) << 32) | offset as u64)
    }

    /// Reinterpret a raw 64-bit value (e.g. received over FFI).
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit encoding.
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Slab ordinal.
    pub const fn slab(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Offset within the slab.
    pub const fn offset(self) -> u32 {
        self.0 as u32
    }

    /// Whether this is [`SlotAddr::NULL`].
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl fmt::Debug for SlotAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "SlotAddr(null)")
        } else {
            write!(f, "SlotAddr({}:{})", self.slab(), self.offset())
        }
    }
}

impl fmt::Display for SlotAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}:{}", self.slab(), self.offset())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_addr_encodes_slab_and_offset() {
        let addr = SlotAddr::new(3, 17);
        assert_eq!(addr.slab(), 3);
        assert_eq!(addr.offset(), 17);
        assert_eq!(SlotAddr::from_raw(addr.to_raw()), addr);
        assert!(!addr.is_null());
    }

    #[test]
    fn slot_addr_orders_by_layout() {
        assert!(SlotAddr::new(0, 1023) < SlotAddr::new(1, 0));
        assert!(SlotAddr::new(2, 4) > SlotAddr::new(2, 3));
    }

    #[test]
    fn null_addr_displays_as_null() {
        assert!(SlotAddr::NULL.is_null());
        assert_eq!(SlotAddr::NULL.to_string(), "null");
        assert_eq!(SlotAddr::new(1, 2).to_string(), "1:2");
    }

    #[test]
    fn object_ids_are_unique() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn thread_keys_differ_across_threads() {
        let here = ThreadKey::current();
        let there = std::thread::spawn(ThreadKey::current).join().unwrap();
        assert_ne!(here, there);
        assert_eq!(here, ThreadKey::current());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn slot_addr_order_matches_tuple_order(
                a in (0u32..1000, 0u32..1000),
                b in (0u32..1000, 0u32..1000),
            ) {
                let x = SlotAddr::new(a.0, a.1);
                let y = SlotAddr::new(b.0, b.1);
                prop_assert_eq!(x.cmp(&y), a.cmp(&b));
            }
        }
    }
}

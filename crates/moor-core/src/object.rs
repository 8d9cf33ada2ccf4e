//! Engine objects and their strong/weak reference tallies.
//!
//! An [`Object`] stands in for an engine-managed value. The handle layer
//! never constructs engine values itself; it only counts who refers to
//! them. Two tallies are kept so that releasing a weak slot can never
//! steal a strong referrer's count (and vice versa):
//!
//! - **strong**: referrers that keep the object alive unconditionally.
//! - **weak**: referrers that keep it alive only if a weak callback revives
//!   one of them during a sweep.
//!
//! The payload is dropped exactly once, the moment both tallies reach zero.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::id::ObjectId;

/// Which tally a reference is accounted against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// Keeps the object alive.
    Strong,
    /// Does not keep the object alive by itself.
    Weak,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strong => write!(f, "strong"),
            Self::Weak => write!(f, "weak"),
        }
    }
}

type Payload = Box<dyn Any + Send>;

struct ObjectInner {
    id: ObjectId,
    strong: AtomicU32,
    weak: AtomicU32,
    destroyed: AtomicBool,
    payload: Mutex<Option<Payload>>,
}

/// A pointer to an engine object.
///
/// Cloning an `Object` copies the pointer; it does **not** add a referrer.
/// Referrers are added and removed only through [`retain`](Object::retain)
/// and [`release`](Object::release), which the slab allocators call on
/// insert and delete.
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

// Compile-time assertion: Object must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Object>();
};

impl Object {
    /// Wrap an engine payload. The new object has no referrers.
    pub fn new<T: Any + Send>(payload: T) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                id: ObjectId::next(),
                strong: AtomicU32::new(0),
                weak: AtomicU32::new(0),
                destroyed: AtomicBool::new(false),
                payload: Mutex::new(Some(Box::new(payload))),
            }),
        }
    }

    /// This object's identity.
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Number of strong referrers.
    pub fn strong_count(&self) -> u32 {
        self.inner.strong.load(Ordering::Acquire)
    }

    /// Number of weak referrers.
    pub fn weak_count(&self) -> u32 {
        self.inner.weak.load(Ordering::Acquire)
    }

    /// Total referrers of either kind.
    pub fn ref_count(&self) -> u32 {
        self.strong_count() + self.weak_count()
    }

    /// Whether the payload has been dropped.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Reachable only through weak referrers, pending a sweep decision.
    pub fn is_near_death(&self) -> bool {
        !self.is_destroyed() && self.strong_count() == 0 && self.weak_count() > 0
    }

    /// Add one referrer of the given kind.
    pub fn retain(&self, kind: RefKind) {
        debug_assert!(!self.is_destroyed(), "retain on destroyed object {}", self.id());
        self.tally(kind).fetch_add(1, Ordering::AcqRel);
    }

    /// Remove one referrer of the given kind.
    ///
    /// Returns `true` if this release dropped the last referrer and the
    /// object was destroyed. Releasing a tally that is already zero is a
    /// no-op that returns `false`.
    pub fn release(&self, kind: RefKind) -> bool {
        if !take_one(self.tally(kind)) {
            return false;
        }
        if self.strong_count() == 0 && self.weak_count() == 0 {
            return self.destroy();
        }
        false
    }

    /// Move one referrer from the strong tally to the weak tally.
    ///
    /// Never destroys: an object whose last strong referrer became weak is
    /// near death and waits for a sweep.
    pub fn weaken(&self) {
        if take_one(&self.inner.strong) {
            self.inner.weak.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Move one referrer from the weak tally back to the strong tally.
    pub fn strengthen(&self) {
        if take_one(&self.inner.weak) {
            self.inner.strong.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Run `f` against the payload if it is still alive and of type `T`.
    pub fn with_payload<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.inner.payload.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref()?.downcast_ref::<T>().map(f)
    }

    /// Whether two pointers refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn tally(&self, kind: RefKind) -> &AtomicU32 {
        match kind {
            RefKind::Strong => &self.inner.strong,
            RefKind::Weak => &self.inner.weak,
        }
    }

    fn destroy(&self) -> bool {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let payload = self
            .inner
            .payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Dropped outside the lock so payload destructors may inspect the object.
        drop(payload);
        true
    }
}

/// Decrement without wrapping. Returns `false` if the tally was already zero.
fn take_one(tally: &AtomicU32) -> bool {
    tally
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id())
            .field("strong", &self.strong_count())
            .field("weak", &self.weak_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counted() -> (Object, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        (Object::new(DropCounter(drops.clone())), drops)
    }

    #[test]
    fn new_object_has_no_referrers() {
        let obj = Object::new(7u32);
        assert_eq!(obj.ref_count(), 0);
        assert!(!obj.is_destroyed());
        assert_eq!(obj.with_payload(|v: &u32| *v), Some(7));
    }

    #[test]
    fn last_strong_release_destroys() {
        let (obj, drops) = counted();
        obj.retain(RefKind::Strong);
        obj.retain(RefKind::Strong);
        assert!(!obj.release(RefKind::Strong));
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert!(obj.release(RefKind::Strong));
        assert!(obj.is_destroyed());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn weak_referrer_keeps_object_until_released() {
        let (obj, drops) = counted();
        obj.retain(RefKind::Strong);
        obj.retain(RefKind::Weak);
        assert!(!obj.release(RefKind::Strong));
        assert!(obj.is_near_death());
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert!(obj.release(RefKind::Weak));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn weaken_and_strengthen_move_between_tallies() {
        let obj = Object::new(());
        obj.retain(RefKind::Strong);
        obj.weaken();
        assert_eq!((obj.strong_count(), obj.weak_count()), (0, 1));
        assert!(obj.is_near_death());
        assert!(!obj.is_destroyed());
        obj.strengthen();
        assert_eq!((obj.strong_count(), obj.weak_count()), (1, 0));
        assert!(!obj.is_near_death());
    }

    #[test]
    fn payload_is_gone_after_destroy() {
        let obj = Object::new(String::from("hi"));
        obj.retain(RefKind::Strong);
        obj.release(RefKind::Strong);
        assert_eq!(obj.with_payload(|s: &String| s.len()), None);
    }

    #[test]
    fn clone_is_pointer_copy() {
        let obj = Object::new(1u8);
        let copy = obj.clone();
        assert_eq!(obj, copy);
        assert_eq!(copy.ref_count(), 0);
        assert_ne!(obj, Object::new(1u8));
    }

    #[test]
    fn wrong_payload_type_yields_none() {
        let obj = Object::new(1u8);
        assert_eq!(obj.with_payload(|v: &u32| *v), None);
    }
}

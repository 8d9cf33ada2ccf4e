//! Reusable object fixtures.
//!
//! - [`tracked_object`]: an [`Object`] whose payload counts its own drop.
//! - [`TrackedObjects`]: a batch of tracked objects sharing one counter.
//! - [`CallLog`]: a cloneable, thread-safe append-only log.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use moor_core::Object;

/// Shared count of dropped payloads.
#[derive(Clone, Debug, Default)]
pub struct DropCounter(Arc<AtomicUsize>);

impl DropCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads dropped so far.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Payload that bumps its counter when dropped.
struct DropProbe(DropCounter);

impl Drop for DropProbe {
    fn drop(&mut self) {
        (self.0).0.fetch_add(1, Ordering::SeqCst);
    }
}

/// An object whose payload increments `counter` when the object is
/// destroyed.
pub fn tracked_object(counter: &DropCounter) -> Object {
    Object::new(DropProbe(counter.clone()))
}

/// A batch of tracked objects sharing one [`DropCounter`].
pub struct TrackedObjects {
    objects: Vec<Object>,
    drops: DropCounter,
}

impl TrackedObjects {
    /// Create `n` tracked objects.
    pub fn new(n: usize) -> Self {
        let drops = DropCounter::new();
        let objects = (0..n).map(|_| tracked_object(&drops)).collect();
        Self { objects, drops }
    }

    /// The `i`-th object.
    pub fn get(&self, i: usize) -> &Object {
        &self.objects[i]
    }

    /// All objects.
    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    /// Payloads dropped so far.
    pub fn dropped(&self) -> usize {
        self.drops.get()
    }

    /// Objects not yet destroyed.
    pub fn live(&self) -> usize {
        self.objects.iter().filter(|o| !o.is_destroyed()).count()
    }

    /// Sum of strong tallies over all objects.
    pub fn total_strong(&self) -> u64 {
        self.objects.iter().map(|o| u64::from(o.strong_count())).sum()
    }
}

/// Cloneable append-only log shared between a test and its callbacks.
#[derive(Debug)]
pub struct CallLog<T>(Arc<Mutex<Vec<T>>>);

impl<T> CallLog<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, entry: T) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> CallLog<T> {
    /// Copy of every entry, in push order.
    pub fn entries(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }
}

impl<T> Clone for CallLog<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Default for CallLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

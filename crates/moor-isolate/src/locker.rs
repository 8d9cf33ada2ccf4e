//! The isolate lock: [`Locker`] and [`Unlocker`].
//!
//! The lock is reentrant per thread. Taking the first `Locker` switches
//! the isolate into locking mode, after which handle operations require
//! the calling thread to hold the lock. An `Unlocker` hands the lock to
//! other threads for its lifetime and takes it back, at the same depth,
//! when dropped.

use std::marker::PhantomData;
use std::sync::PoisonError;

use moor_core::{HandleError, ThreadKey, UsageError};

use crate::isolate::Isolate;

/// Owner and depth of an isolate's lock.
#[derive(Debug, Default)]
pub(crate) struct LockState {
    owner: Option<ThreadKey>,
    depth: u32,
    locking_mode: bool,
}

impl LockState {
    pub(crate) fn locking_mode(&self) -> bool {
        self.locking_mode
    }

    pub(crate) fn is_held_by(&self, thread: ThreadKey) -> bool {
        self.owner == Some(thread)
    }
}

impl Isolate {
    /// Whether the calling thread holds this isolate's lock.
    pub fn is_locked_by_current_thread(&self) -> bool {
        self.lock_state().is_held_by(ThreadKey::current())
    }

    /// Whether any [`Locker`] was ever taken on this isolate.
    pub fn is_locking_mode(&self) -> bool {
        self.lock_state().locking_mode
    }

    /// Block until the lock is free or already ours, then take it at
    /// `depth` (or one level deeper if already held).
    fn acquire(&self, me: ThreadKey, depth: Option<u32>) {
        let mut state = self.lock_state();
        while state.owner.is_some_and(|owner| owner != me) {
            state = self
                .lock_released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.owner = Some(me);
        state.locking_mode = true;
        state.depth = match depth {
            Some(d) => d,
            None => state.depth + 1,
        };
    }

    fn release(&self, me: ThreadKey, all: bool) -> u32 {
        let mut state = self.lock_state();
        if !state.is_held_by(me) {
            return 0;
        }
        let held = state.depth;
        state.depth = if all { 0 } else { held.saturating_sub(1) };
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.lock_released.notify_all();
        }
        held
    }
}

/// Holds an isolate's lock for its lifetime. Reentrant.
///
/// Thread-affine: not `Send`.
#[derive(Debug)]
pub struct Locker<'i> {
    isolate: &'i Isolate,
    _thread: PhantomData<*const ()>,
}

impl<'i> Locker<'i> {
    /// Block until the calling thread holds `isolate`'s lock.
    pub fn new(isolate: &'i Isolate) -> Self {
        let me = ThreadKey::current();
        isolate.acquire(me, None);
        tracing::trace!(isolate = %isolate.id(), thread = %me, "isolate locked");
        Self {
            isolate,
            _thread: PhantomData,
        }
    }

    /// The locked isolate.
    pub fn isolate(&self) -> &'i Isolate {
        self.isolate
    }
}

impl Drop for Locker<'_> {
    fn drop(&mut self) {
        let me = ThreadKey::current();
        self.isolate.release(me, false);
        tracing::trace!(isolate = %self.isolate.id(), thread = %me, "isolate unlocked");
    }
}

/// Temporarily gives up a held isolate lock.
///
/// Thread-affine: not `Send`.
#[derive(Debug)]
pub struct Unlocker<'i> {
    isolate: &'i Isolate,
    depth: u32,
    _thread: PhantomData<*const ()>,
}

impl<'i> Unlocker<'i> {
    /// Release `isolate`'s lock, which the calling thread must hold.
    pub fn new(isolate: &'i Isolate) -> Result<Self, HandleError> {
        let me = ThreadKey::current();
        let depth = isolate.release(me, true);
        if depth == 0 {
            return Err(isolate.fail(
                "Unlocker::new",
                UsageError::NotLocked {
                    isolate: isolate.id(),
                }
                .into(),
            ));
        }
        tracing::trace!(isolate = %isolate.id(), thread = %me, depth, "isolate lock yielded");
        Ok(Self {
            isolate,
            depth,
            _thread: PhantomData,
        })
    }
}

impl Drop for Unlocker<'_> {
    fn drop(&mut self) {
        let me = ThreadKey::current();
        self.isolate.acquire(me, Some(self.depth));
        tracing::trace!(isolate = %self.isolate.id(), thread = %me, "isolate lock regained");
    }
}

//! The isolate: one engine instance's handle storage and thread entry.
//!
//! All handle storage of an isolate (one [`ScopeStack`] per entered thread
//! plus the [`PersistentStore`]) lives behind a single heap mutex. Every
//! operation that touches it first checks that the calling thread has
//! entered the isolate and, once any [`Locker`](crate::Locker) has been
//! taken, that it holds the isolate lock.
//!
//! Failures are reported through the configured
//! [`FatalErrorHandler`] and then returned. Usage errors and resource
//! exhaustion mark the isolate dead; a dead isolate refuses to create new
//! persistent handles.

use std::cell::RefCell;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use indexmap::map::Entry;
use indexmap::IndexMap;

use moor_arena::{ArenaConfig, Frontier};
use moor_core::{
    FatalErrorHandler, HandleError, IsolateId, Object, ScopeId, SlotAddr, ThreadKey, UsageError,
};

use crate::config::{ConfigError, IsolateConfig, RootObserver};
use crate::handle::{EnterGuard, HandleScope, Local, Persistent};
use crate::locker::LockState;
use crate::persistent::{PersistentStore, SweepReport, WeakCallbackInfo, WeakOutcome, WeakParam};
use crate::registry::{ExitOutcome, IsolateThreadRegistry};
use crate::scope::{RootTransition, ScopeStack};

thread_local! {
    /// One element per outstanding enter on this thread, oldest first.
    /// The last element is the current isolate.
    static ENTERED: RefCell<Vec<Arc<Isolate>>> = const { RefCell::new(Vec::new()) };
}

// ── RootEvent ──────────────────────────────────────────────────────

/// A thread's local storage started or stopped holding live references.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootEvent {
    /// The isolate the thread belongs to.
    pub isolate: IsolateId,
    /// The thread whose scope stack changed.
    pub thread: ThreadKey,
    /// [`RootTransition::Activated`] or [`RootTransition::Idle`].
    pub transition: RootTransition,
    /// Threads holding live locals after the transition.
    pub rooting_threads: usize,
}

/// Where a root reported by [`Isolate::iterate_roots`] lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootKind {
    /// A local handle on `thread`'s scope stack.
    Local {
        /// Owning thread.
        thread: ThreadKey,
    },
    /// A strong persistent handle.
    Persistent,
}

/// Point-in-time counters for an isolate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IsolateStats {
    /// Local slots across all threads (escaped-from slots included).
    pub local_slots: usize,
    /// Open handle scopes across all threads.
    pub open_scopes: usize,
    /// Occupied persistent slots.
    pub persistents: usize,
    /// Persistent slots carrying weak metadata.
    pub weak: usize,
    /// Threads holding live locals.
    pub rooting_threads: usize,
    /// Threads currently entered.
    pub entered_threads: usize,
}

// ── Heap ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct Heap {
    scopes: IndexMap<ThreadKey, ScopeStack>,
    persistents: PersistentStore,
    rooting_threads: usize,
}

impl Heap {
    fn note(
        &mut self,
        isolate: IsolateId,
        thread: ThreadKey,
        transition: RootTransition,
    ) -> Option<RootEvent> {
        match transition {
            RootTransition::Unchanged => return None,
            RootTransition::Activated => self.rooting_threads += 1,
            RootTransition::Idle => self.rooting_threads = self.rooting_threads.saturating_sub(1),
        }
        Some(RootEvent {
            isolate,
            thread,
            transition,
            rooting_threads: self.rooting_threads,
        })
    }
}

// ── Isolate ────────────────────────────────────────────────────────

/// One engine instance's handle layer.
///
/// Shared across threads as `Arc<Isolate>`. Threads enter it to create
/// locals and use persistent handles; the isolate lock serializes threads
/// once locking is in use.
pub struct Isolate {
    id: IsolateId,
    locals: ArenaConfig,
    heap: Mutex<Heap>,
    threads: Mutex<IsolateThreadRegistry<Weak<Isolate>>>,
    pub(crate) lock: Mutex<LockState>,
    pub(crate) lock_released: Condvar,
    dead: AtomicBool,
    fatal_handler: Arc<dyn FatalErrorHandler>,
    root_observer: Option<RootObserver>,
}

// Compile-time assertion: Isolate is shared across threads behind an Arc.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Isolate>();
};

impl Isolate {
    /// Create an isolate after validating `config`.
    pub fn new(config: IsolateConfig) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let persistents =
            PersistentStore::new(&config.persistents).map_err(ConfigError::Persistents)?;
        let isolate = Arc::new(Self {
            id: IsolateId::next(),
            locals: config.locals,
            heap: Mutex::new(Heap {
                scopes: IndexMap::new(),
                persistents,
                rooting_threads: 0,
            }),
            threads: Mutex::new(IsolateThreadRegistry::new()),
            lock: Mutex::new(LockState::default()),
            lock_released: Condvar::new(),
            dead: AtomicBool::new(false),
            fatal_handler: config.fatal_handler,
            root_observer: config.root_observer,
        });
        tracing::debug!(isolate = %isolate.id, "isolate created");
        Ok(isolate)
    }

    /// This isolate's ID.
    pub fn id(&self) -> IsolateId {
        self.id
    }

    /// The calling thread's current isolate.
    pub fn current() -> Option<Arc<Isolate>> {
        ENTERED.with(|e| e.borrow().last().cloned())
    }

    // ── Thread entry ───────────────────────────────────────────────

    /// Enter the isolate on the calling thread and make it current.
    ///
    /// Reentrant; returns the thread's entry count afterwards. The thread
    /// keeps the isolate alive until every enter is undone.
    pub fn enter(self: &Arc<Self>) -> u32 {
        let me = ThreadKey::current();
        let count = self
            .registry()
            .enter(me, || Self::current().map(|prev| Arc::downgrade(&prev)));
        ENTERED.with(|e| e.borrow_mut().push(Arc::clone(self)));
        tracing::debug!(isolate = %self.id, thread = %me, count, "isolate entered");
        count
    }

    /// Undo one [`enter`](Self::enter).
    ///
    /// Removes this isolate's most recent enter from the thread's stack;
    /// the current isolate becomes whatever is then on top. Exits need not
    /// nest across isolates: leaving an isolate that is not current leaves
    /// the current isolate alone.
    pub fn exit(&self) -> Result<(), HandleError> {
        let me = ThreadKey::current();
        let outcome = self.registry().exit(me);
        let Some(outcome) = outcome else {
            return Err(self.fail(
                "Isolate::exit",
                UsageError::NotEntered { isolate: self.id }.into(),
            ));
        };
        // If the isolate now filling the gap had its first enter there, its
        // predecessor changes.
        let (removed, relink) = ENTERED.with(|e| {
            let mut stack = e.borrow_mut();
            let Some(pos) = stack.iter().rposition(|iso| ptr::eq(Arc::as_ptr(iso), self)) else {
                return (None, None);
            };
            let removed = stack.remove(pos);
            let relink = stack
                .get(pos)
                .filter(|above| !stack[..pos].iter().any(|iso| Arc::ptr_eq(iso, above)))
                .map(|above| {
                    let below = pos.checked_sub(1).map(|i| Arc::downgrade(&stack[i]));
                    (Arc::clone(above), below)
                });
            (Some(removed), relink)
        });
        if let Some((above, below)) = relink {
            above.registry().relink(me, below);
        }
        match outcome {
            ExitOutcome::Stayed { remaining } => {
                tracing::debug!(isolate = %self.id, thread = %me, remaining, "isolate exited");
            }
            ExitOutcome::Left { .. } => {
                tracing::debug!(isolate = %self.id, thread = %me, "isolate left by thread");
            }
        }
        // Dropped outside the TLS borrow: this may be the last Arc.
        drop(removed);
        Ok(())
    }

    /// Enter and return a guard that exits on drop.
    pub fn entered(self: &Arc<Self>) -> EnterGuard {
        EnterGuard::new(self)
    }

    /// Whether any thread is entered.
    pub fn contains_threads(&self) -> bool {
        self.registry().contains_threads()
    }

    /// The calling thread's entry count (0 if not entered).
    pub fn entry_count(&self) -> u32 {
        self.registry()
            .get(ThreadKey::current())
            .map_or(0, |e| e.entry_count())
    }

    /// Whether the isolate is dead.
    ///
    /// Any failure reported through the fatal handler marks it dead: usage
    /// errors (a double `close_scope`, an exit without enter) and resource
    /// exhaustion count, as does [`FatalErrorHandler::engine_dead`]. A dead
    /// isolate refuses new persistent handles with
    /// [`HandleError::EngineDead`].
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire) || self.fatal_handler.engine_dead()
    }

    // ── Handle scopes and locals ───────────────────────────────────

    /// Open a handle scope on the calling thread.
    pub fn open_scope(&self) -> Result<ScopeId, HandleError> {
        self.run("HandleScope::new", |heap, me| {
            let stack = match heap.scopes.entry(me) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(v) => v.insert(ScopeStack::new(&self.locals)?),
            };
            Ok((stack.enter(), None))
        })
    }

    /// Close the calling thread's innermost scope, which must be `scope`.
    pub fn close_scope(&self, scope: ScopeId) -> Result<(), HandleError> {
        self.run("HandleScope::close", |heap, me| {
            let stack = heap
                .scopes
                .get_mut(&me)
                .ok_or(UsageError::ScopeAlreadyClosed { scope })?;
            let (_, transition) = stack.leave(scope)?;
            if stack.is_empty() {
                heap.scopes.swap_remove(&me);
            }
            Ok(((), heap.note(self.id, me, transition)))
        })
    }

    /// Open a scope and return a guard that closes it on drop.
    pub fn handle_scope(&self) -> Result<HandleScope<'_>, HandleError> {
        HandleScope::new(self)
    }

    /// Create a local handle to `object` in the innermost scope.
    pub fn create_local(&self, object: &Object) -> Result<Local, HandleError> {
        self.add_local(object).map(|(local, _)| local)
    }

    /// As [`create_local`](Self::create_local), also returning the local
    /// allocator's frontier after the add.
    pub fn add_local(&self, object: &Object) -> Result<(Local, Frontier), HandleError> {
        self.add_local_to(None, object)
    }

    /// Add a local, optionally requiring `scope` to be the innermost one.
    pub(crate) fn add_local_to(
        &self,
        scope: Option<ScopeId>,
        object: &Object,
    ) -> Result<(Local, Frontier), HandleError> {
        self.run("Local::new", |heap, me| {
            let stack = heap
                .scopes
                .get_mut(&me)
                .ok_or(UsageError::NoEnclosingScope)?;
            if let Some(scope) = scope {
                match stack.innermost() {
                    Some(top) if top == scope => {}
                    Some(top) if stack.is_open(scope) => {
                        return Err(UsageError::ScopeNotInnermost {
                            scope,
                            innermost: top,
                        }
                        .into())
                    }
                    _ => return Err(UsageError::ScopeAlreadyClosed { scope }.into()),
                }
            }
            let (owner, added, transition) = stack.add(object)?;
            let local = Local::new(self.id, owner, added.slot);
            Ok(((local, added.frontier), heap.note(self.id, me, transition)))
        })
    }

    /// The object a local handle points at.
    pub fn get_local(&self, local: Local) -> Result<Object, HandleError> {
        self.run("Local::get", |heap, me| {
            self.check_owner(local.isolate())?;
            let stack = heap.scopes.get(&me).ok_or(UsageError::StaleLocal {
                scope: local.scope(),
            })?;
            Ok((stack.get(local.scope(), local.slot())?.clone(), None))
        })
    }

    /// Close `scope` and move `local` into its parent scope.
    pub fn escape(&self, scope: ScopeId, local: Local) -> Result<Local, HandleError> {
        self.run("HandleScope::escape", |heap, me| {
            self.check_owner(local.isolate())?;
            let stack = heap
                .scopes
                .get_mut(&me)
                .ok_or(UsageError::ScopeAlreadyClosed { scope })?;
            let escaped = stack.escape(scope, local.slot())?;
            let moved = Local::new(self.id, escaped.parent, escaped.added.slot);
            Ok((moved, heap.note(self.id, me, escaped.transition)))
        })
    }

    // ── Persistent handles ─────────────────────────────────────────

    /// Create a strong persistent handle to `object`.
    ///
    /// Fails with [`HandleError::EngineDead`] once a fatal error has been
    /// signalled, without touching storage.
    pub fn make_persistent(&self, object: &Object) -> Result<Persistent, HandleError> {
        if self.is_dead() {
            return Err(self.fail("Persistent::new", HandleError::EngineDead));
        }
        self.run("Persistent::new", |heap, _| {
            let slot = heap.persistents.make_persistent(object)?;
            Ok((Persistent::new(self.id, slot), None))
        })
    }

    /// Create a strong persistent handle from a local.
    pub fn persist_local(&self, local: Local) -> Result<Persistent, HandleError> {
        let object = self.get_local(local)?;
        self.make_persistent(&object)
    }

    /// Release a persistent handle. Tolerates a handle whose slot was
    /// already zeroed by a weak sweep.
    pub fn dispose(&self, handle: Persistent) -> Result<(), HandleError> {
        self.run("Persistent::dispose", |heap, _| {
            self.check_owner(handle.isolate())?;
            heap.persistents.delete_persistent(handle.slot())?;
            Ok(((), None))
        })
    }

    /// Make a persistent handle weak. `callback` runs during
    /// [`collect_weak`](Self::collect_weak) once only weak handles reach
    /// the object.
    pub fn make_weak<F>(&self, handle: Persistent, param: WeakParam, callback: F) -> Result<(), HandleError>
    where
        F: FnMut(&WeakCallbackInfo<'_>) -> WeakOutcome + Send + 'static,
    {
        self.run("Persistent::make_weak", |heap, _| {
            self.check_owner(handle.isolate())?;
            heap.persistents
                .make_weak(handle.slot(), param, Box::new(callback))?;
            Ok(((), None))
        })
    }

    /// Make a weak persistent handle strong again.
    pub fn clear_weakness(&self, handle: Persistent) -> Result<(), HandleError> {
        self.run("Persistent::clear_weak", |heap, _| {
            self.check_owner(handle.isolate())?;
            heap.persistents.clear_weakness(handle.slot())?;
            Ok(((), None))
        })
    }

    /// Whether `handle` is weak.
    pub fn is_weak(&self, handle: Persistent) -> bool {
        handle.isolate() == self.id && self.heap().persistents.is_weak(handle.slot())
    }

    /// Whether `handle` is weak and its object has no strong referrers.
    pub fn is_near_death(&self, handle: Persistent) -> bool {
        handle.isolate() == self.id && self.heap().persistents.is_near_death(handle.slot())
    }

    /// The object `handle` points at, or `None` if its slot is zeroed.
    pub fn get_persistent(&self, handle: Persistent) -> Option<Object> {
        if handle.isolate() != self.id {
            return None;
        }
        self.heap().persistents.get(handle.slot()).cloned()
    }

    // ── Collector interface ────────────────────────────────────────

    /// Run the weak sweep. Called by the engine collector at a safepoint.
    ///
    /// Weak callbacks run with the heap mutex held and must not call back
    /// into this isolate.
    pub fn collect_weak(&self) -> SweepReport {
        let report = self.heap().persistents.sweep();
        if report.destroyed > 0 {
            tracing::warn!(
                isolate = %self.id,
                invoked = report.invoked,
                revived = report.revived,
                cleared = report.cleared,
                destroyed = report.destroyed,
                "weak sweep destroyed objects"
            );
        } else {
            tracing::debug!(isolate = %self.id, invoked = report.invoked, revived = report.revived, "weak sweep");
        }
        report
    }

    /// Visit every strong root: all threads' locals, then strong
    /// persistent handles, each in layout order.
    pub fn iterate_roots(&self, mut visit: impl FnMut(RootKind, SlotAddr, &Object)) {
        let heap = self.heap();
        for (&thread, stack) in &heap.scopes {
            stack.iterate(|addr, object| visit(RootKind::Local { thread }, addr, object));
        }
        heap.persistents
            .iterate_strong(|addr, object| visit(RootKind::Persistent, addr, object));
    }

    /// Current counters.
    pub fn stats(&self) -> IsolateStats {
        let entered_threads = self.registry().thread_count();
        let heap = self.heap();
        IsolateStats {
            local_slots: heap.scopes.values().map(ScopeStack::number_of_items).sum(),
            open_scopes: heap.scopes.values().map(ScopeStack::depth).sum(),
            persistents: heap.persistents.len(),
            weak: heap.persistents.weak_count(),
            rooting_threads: heap.rooting_threads,
            entered_threads,
        }
    }

    // ── Internals ──────────────────────────────────────────────────

    fn heap(&self) -> MutexGuard<'_, Heap> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> MutexGuard<'_, IsolateThreadRegistry<Weak<Isolate>>> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The calling thread must be entered and, in locking mode, hold the
    /// isolate lock.
    fn check_access(&self) -> Result<ThreadKey, UsageError> {
        let me = ThreadKey::current();
        if !self.registry().contains_thread(me) {
            return Err(UsageError::NotEntered { isolate: self.id });
        }
        let lock = self.lock_state();
        if lock.locking_mode() && !lock.is_held_by(me) {
            return Err(UsageError::NotLocked { isolate: self.id });
        }
        Ok(me)
    }

    fn check_owner(&self, owner: IsolateId) -> Result<(), UsageError> {
        if owner == self.id {
            Ok(())
        } else {
            Err(UsageError::WrongIsolate {
                expected: owner,
                actual: self.id,
            })
        }
    }

    /// Run `op` on the heap after the access check. Errors are signalled
    /// and root events emitted after the heap mutex is released.
    fn run<T>(
        &self,
        location: &'static str,
        op: impl FnOnce(&mut Heap, ThreadKey) -> Result<(T, Option<RootEvent>), HandleError>,
    ) -> Result<T, HandleError> {
        let result = self
            .check_access()
            .map_err(HandleError::from)
            .and_then(|me| op(&mut self.heap(), me));
        match result {
            Ok((value, event)) => {
                if let Some(event) = event {
                    self.emit(event);
                }
                Ok(value)
            }
            Err(e) => Err(self.fail(location, e)),
        }
    }

    /// Report `err` through the fatal-error facility and hand it back.
    /// Every error but [`HandleError::EngineDead`] marks the isolate dead.
    pub(crate) fn fail(&self, location: &'static str, err: HandleError) -> HandleError {
        if err != HandleError::EngineDead {
            self.dead.store(true, Ordering::Release);
        }
        self.fatal_handler.signal(location, &err.to_string());
        err
    }

    fn emit(&self, event: RootEvent) {
        tracing::debug!(
            isolate = %event.isolate,
            thread = %event.thread,
            transition = ?event.transition,
            rooting_threads = event.rooting_threads,
            "root transition"
        );
        if let Some(observer) = &self.root_observer {
            observer(event);
        }
    }
}

impl fmt::Debug for Isolate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Isolate")
            .field("id", &self.id)
            .field("dead", &self.dead.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        tracing::debug!(isolate = %self.id, "isolate dropped");
    }
}

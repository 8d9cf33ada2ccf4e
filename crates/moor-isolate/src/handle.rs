//! Typed handles and RAII guards.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use moor_core::{HandleError, IsolateId, Object, ScopeId, SlotAddr};

use crate::isolate::Isolate;

/// A handle to an object, valid while its scope is open.
///
/// Plain data: using a `Local` after its scope closed is detected and
/// reported as [`UsageError::StaleLocal`](moor_core::UsageError::StaleLocal).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Local {
    isolate: IsolateId,
    scope: ScopeId,
    slot: SlotAddr,
}

impl Local {
    /// Reassemble a local from its parts (e.g. received over FFI).
    pub fn new(isolate: IsolateId, scope: ScopeId, slot: SlotAddr) -> Self {
        Self {
            isolate,
            scope,
            slot,
        }
    }

    /// Owning isolate.
    pub fn isolate(&self) -> IsolateId {
        self.isolate
    }

    /// Scope the local belongs to.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Local slot address.
    pub fn slot(&self) -> SlotAddr {
        self.slot
    }
}

impl fmt::Debug for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Local({}@{}/{})", self.slot, self.scope, self.isolate)
    }
}

/// A handle to an object that outlives handle scopes, until disposed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Persistent {
    isolate: IsolateId,
    slot: SlotAddr,
}

impl Persistent {
    /// Reassemble a persistent handle from its parts.
    pub fn new(isolate: IsolateId, slot: SlotAddr) -> Self {
        Self { isolate, slot }
    }

    /// Owning isolate.
    pub fn isolate(&self) -> IsolateId {
        self.isolate
    }

    /// Persistent slot address.
    pub fn slot(&self) -> SlotAddr {
        self.slot
    }
}

impl fmt::Debug for Persistent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Persistent({}/{})", self.slot, self.isolate)
    }
}

/// Keeps the calling thread entered into an isolate until dropped.
#[derive(Debug)]
pub struct EnterGuard {
    isolate: Arc<Isolate>,
    _thread: PhantomData<*const ()>,
}

impl EnterGuard {
    pub(crate) fn new(isolate: &Arc<Isolate>) -> Self {
        isolate.enter();
        Self {
            isolate: Arc::clone(isolate),
            _thread: PhantomData,
        }
    }

    /// The entered isolate.
    pub fn isolate(&self) -> &Arc<Isolate> {
        &self.isolate
    }
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let _ = self.isolate.exit();
    }
}

/// An open handle scope. Closing it (explicitly or by drop) releases
/// every local created in it.
#[derive(Debug)]
pub struct HandleScope<'i> {
    isolate: &'i Isolate,
    id: ScopeId,
    open: bool,
    _thread: PhantomData<*const ()>,
}

impl<'i> HandleScope<'i> {
    /// Open a scope on the calling thread.
    pub fn new(isolate: &'i Isolate) -> Result<Self, HandleError> {
        let id = isolate.open_scope()?;
        Ok(Self {
            isolate,
            id,
            open: true,
            _thread: PhantomData,
        })
    }

    /// This scope's ID.
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// The isolate the scope belongs to.
    pub fn isolate(&self) -> &'i Isolate {
        self.isolate
    }

    /// Create a local in this scope, which must be the innermost one.
    pub fn create(&self, object: &Object) -> Result<Local, HandleError> {
        self.isolate
            .add_local_to(Some(self.id), object)
            .map(|(local, _)| local)
    }

    /// The object a local points at.
    pub fn get(&self, local: Local) -> Result<Object, HandleError> {
        self.isolate.get_local(local)
    }

    /// Close the scope, moving `local` into the parent scope.
    pub fn escape(mut self, local: Local) -> Result<Local, HandleError> {
        let escaped = self.isolate.escape(self.id, local);
        if escaped.is_ok() {
            self.open = false;
        }
        escaped
    }

    /// Close the scope, reporting any usage error.
    pub fn close(mut self) -> Result<(), HandleError> {
        self.open = false;
        self.isolate.close_scope(self.id)
    }
}

impl Drop for HandleScope<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.isolate.close_scope(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IsolateConfig;
    use moor_arena::ArenaConfig;
    use moor_core::UsageError;

    fn isolate() -> Arc<Isolate> {
        Isolate::new(IsolateConfig {
            locals: ArenaConfig::new(2),
            ..IsolateConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn guard_exits_on_drop() {
        let iso = isolate();
        {
            let guard = iso.entered();
            assert_eq!(guard.isolate().id(), iso.id());
            assert_eq!(iso.entry_count(), 1);
        }
        assert_eq!(iso.entry_count(), 0);
        assert!(!iso.contains_threads());
    }

    #[test]
    fn dropping_scope_releases_its_locals() {
        let iso = isolate();
        let _entered = iso.entered();
        let obj = Object::new(());
        {
            let scope = iso.handle_scope().unwrap();
            let local = scope.create(&obj).unwrap();
            assert!(scope.get(local).unwrap().ptr_eq(&obj));
            assert_eq!(obj.strong_count(), 1);
        }
        assert!(obj.is_destroyed());
    }

    #[test]
    fn local_is_stale_after_close() {
        let iso = isolate();
        let _entered = iso.entered();
        let obj = Object::new(());
        let scope = iso.handle_scope().unwrap();
        let local = scope.create(&obj).unwrap();
        scope.close().unwrap();
        assert_eq!(
            iso.get_local(local).unwrap_err(),
            HandleError::Usage(UsageError::StaleLocal {
                scope: local.scope()
            })
        );
    }

    #[test]
    fn escaped_local_lives_in_parent() {
        let iso = isolate();
        let _entered = iso.entered();
        let obj = Object::new(());
        let outer = iso.handle_scope().unwrap();
        let escaped = {
            let inner = iso.handle_scope().unwrap();
            inner.create(&Object::new(())).unwrap();
            let local = inner.create(&obj).unwrap();
            inner.escape(local).unwrap()
        };
        assert_eq!(escaped.scope(), outer.id());
        assert_eq!(obj.strong_count(), 1);
        assert!(outer.get(escaped).unwrap().ptr_eq(&obj));
        drop(outer);
        assert!(obj.is_destroyed());
    }

    #[test]
    fn create_in_outer_scope_while_inner_open_is_rejected() {
        let iso = isolate();
        let _entered = iso.entered();
        let outer = iso.handle_scope().unwrap();
        let inner = iso.handle_scope().unwrap();
        let err = outer.create(&Object::new(())).unwrap_err();
        assert_eq!(
            err,
            HandleError::Usage(UsageError::ScopeNotInnermost {
                scope: outer.id(),
                innermost: inner.id()
            })
        );
    }

    #[test]
    fn handles_format_compactly() {
        let p = Persistent::new(IsolateId::next(), SlotAddr::new(0, 3));
        assert!(format!("{p:?}").starts_with("Persistent(0:3/"));
    }
}

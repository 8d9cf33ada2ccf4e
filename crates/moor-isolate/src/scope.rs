//! Per-thread stack of handle scopes over a local-handle allocator.
//!
//! Entering a scope records a [`Checkpoint`]; leaving it deletes the local
//! allocator back to that checkpoint, so every local created inside the
//! scope is released exactly once. Escaping moves one counted reference
//! out of the closing scope into its parent without touching the tally.

use moor_arena::{AddResult, ArenaConfig, ArenaError, Checkpoint, SlabAllocator, Slot};
use moor_core::{HandleError, Object, ScopeId, SlotAddr, UsageError};

/// Change in whether a stack holds any live local slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootTransition {
    /// Live count unchanged in kind (still zero, or still non-zero).
    Unchanged,
    /// Live count went from zero to non-zero.
    Activated,
    /// Live count went from non-zero to zero.
    Idle,
}

impl RootTransition {
    fn between(before: usize, after: usize) -> Self {
        match (before > 0, after > 0) {
            (false, true) => Self::Activated,
            (true, false) => Self::Idle,
            _ => Self::Unchanged,
        }
    }
}

#[derive(Debug)]
struct ScopeFrame {
    id: ScopeId,
    checkpoint: Checkpoint,
}

/// Result of escaping a slot into the parent scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Escaped {
    /// The scope the reference now belongs to.
    pub parent: ScopeId,
    /// The parent-scope slot holding the reference.
    pub added: AddResult,
    /// Root transition caused by the close.
    pub transition: RootTransition,
}

/// LIFO stack of handle scopes for one thread of one isolate.
#[derive(Debug)]
pub struct ScopeStack {
    locals: SlabAllocator,
    frames: Vec<ScopeFrame>,
}

impl ScopeStack {
    /// Create an empty stack whose locals use `config`'s slab layout.
    pub fn new(config: &ArenaConfig) -> Result<Self, ArenaError> {
        Ok(Self {
            locals: SlabAllocator::new(config)?,
            frames: Vec::new(),
        })
    }

    /// Open a scope nested in the current innermost one.
    pub fn enter(&mut self) -> ScopeId {
        let id = ScopeId::next();
        self.frames.push(ScopeFrame {
            id,
            checkpoint: self.locals.checkpoint(),
        });
        tracing::trace!(scope = %id, depth = self.frames.len(), "scope entered");
        id
    }

    /// Close the innermost scope, releasing every local it created.
    ///
    /// Returns the number of slots removed.
    pub fn leave(&mut self, id: ScopeId) -> Result<(usize, RootTransition), HandleError> {
        self.check_innermost(id)?;
        let before = self.locals.number_of_items();
        let removed = self.pop_frame()?;
        tracing::trace!(scope = %id, removed, "scope left");
        Ok((
            removed,
            RootTransition::between(before, self.locals.number_of_items()),
        ))
    }

    /// Add a strong local reference to `object` in the innermost scope.
    pub fn add(&mut self, object: &Object) -> Result<(ScopeId, AddResult, RootTransition), HandleError> {
        let scope = self.innermost().ok_or(UsageError::NoEnclosingScope)?;
        let before = self.locals.number_of_items();
        let added = self.locals.add(object)?;
        Ok((scope, added, RootTransition::between(before, before + 1)))
    }

    /// Close scope `id` and move the reference in `slot` into its parent.
    ///
    /// The slot's counted reference is handed over, not re-counted, so the
    /// object sees no net change and is released exactly once when the
    /// parent closes.
    pub fn escape(&mut self, id: ScopeId, slot: SlotAddr) -> Result<Escaped, HandleError> {
        self.check_innermost(id)?;
        let parent = match self.frames.len() {
            n if n >= 2 => self.frames[n - 2].id,
            _ => return Err(UsageError::EscapeWithoutParent { scope: id }.into()),
        };
        if !self.owns(id, slot) {
            return Err(UsageError::SlotOutsideScope { slot, scope: id }.into());
        }
        let object = self
            .locals
            .get_mut(slot)
            .and_then(Slot::take)
            .ok_or(UsageError::DoubleEscape { slot })?;

        let before = self.locals.number_of_items();
        self.pop_frame()?;
        let added = self.locals.adopt(object)?;
        tracing::trace!(scope = %id, %parent, from = %slot, to = %added.slot, "handle escaped");
        Ok(Escaped {
            parent,
            added,
            transition: RootTransition::between(before, self.locals.number_of_items()),
        })
    }

    /// The object a local handle points at.
    ///
    /// Fails with [`UsageError::StaleLocal`] if `scope` is not open on
    /// this stack or the slot no longer holds a reference.
    pub fn get(&self, scope: ScopeId, slot: SlotAddr) -> Result<&Object, UsageError> {
        if !self.owns(scope, slot) {
            return Err(UsageError::StaleLocal { scope });
        }
        self.locals
            .get(slot)
            .and_then(Slot::object)
            .ok_or(UsageError::StaleLocal { scope })
    }

    /// The innermost open scope.
    pub fn innermost(&self) -> Option<ScopeId> {
        self.frames.last().map(|f| f.id)
    }

    /// Whether `id` is open on this stack.
    pub fn is_open(&self, id: ScopeId) -> bool {
        self.frames.iter().any(|f| f.id == id)
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether no scope is open.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of local slots (nulled escape sources included).
    pub fn number_of_items(&self) -> usize {
        self.locals.number_of_items()
    }

    /// The underlying local allocator.
    pub fn locals(&self) -> &SlabAllocator {
        &self.locals
    }

    /// Visit every live local reference in layout order.
    pub fn iterate(&self, mut visit: impl FnMut(SlotAddr, &Object)) {
        self.locals.iterate(|addr, slot| {
            if let Some(object) = slot.object() {
                visit(addr, object);
            }
        });
    }

    /// Whether `slot` was allocated while `scope` was the innermost scope
    /// or by one of its (closed) children, and is still in storage.
    fn owns(&self, scope: ScopeId, slot: SlotAddr) -> bool {
        let Some(pos) = self.frames.iter().position(|f| f.id == scope) else {
            return false;
        };
        let start = self.frames[pos].checkpoint.next_free();
        let end = self
            .frames
            .get(pos + 1)
            .map_or(self.locals.frontier().next_free, |f| f.checkpoint.next_free());
        slot >= start && slot < end && self.locals.get(slot).is_some()
    }

    fn check_innermost(&self, id: ScopeId) -> Result<(), UsageError> {
        match self.frames.last() {
            Some(top) if top.id == id => Ok(()),
            Some(top) if self.is_open(id) => Err(UsageError::ScopeNotInnermost {
                scope: id,
                innermost: top.id,
            }),
            _ => Err(UsageError::ScopeAlreadyClosed { scope: id }),
        }
    }

    /// Pop the innermost frame and delete back to its checkpoint.
    fn pop_frame(&mut self) -> Result<usize, HandleError> {
        let Some(frame) = self.frames.pop() else {
            return Ok(0);
        };
        let target = frame.checkpoint.next_free();
        if self.locals.frontier().next_free == target {
            return Ok(0);
        }
        Ok(self.locals.delete(Some(target))?)
    }
}

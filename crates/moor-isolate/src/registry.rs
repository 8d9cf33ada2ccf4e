//! Per-isolate record of which threads have entered it.
//!
//! Entry is reentrant: a thread that enters twice must exit twice. The
//! first entry remembers what the thread's current isolate was before.
//! A thread may leave isolates out of order, so the owner of the
//! per-thread stack re-links an entry whose predecessor left first.

use indexmap::IndexMap;

use moor_core::ThreadKey;

/// One thread's entry into an isolate.
#[derive(Clone, Debug)]
pub struct ThreadEntry<P> {
    entry_count: u32,
    previous: Option<P>,
}

impl<P> ThreadEntry<P> {
    /// Outstanding enters by this thread.
    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// The isolate below this one on the thread's entry stack.
    pub fn previous(&self) -> Option<&P> {
        self.previous.as_ref()
    }
}

/// Outcome of a successful [`IsolateThreadRegistry::exit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitOutcome<P> {
    /// The thread still holds `remaining` enters.
    Stayed {
        /// Enters still outstanding.
        remaining: u32,
    },
    /// The thread's last enter was undone; `previous` should become its
    /// current isolate again.
    Left {
        /// The isolate current before the first enter.
        previous: Option<P>,
    },
}

/// Thread entry bookkeeping for one isolate, keyed by thread identity.
///
/// `P` is whatever the caller uses to name the previously current isolate.
#[derive(Clone, Debug)]
pub struct IsolateThreadRegistry<P> {
    entries: IndexMap<ThreadKey, ThreadEntry<P>>,
}

impl<P> IsolateThreadRegistry<P> {
    /// Create a registry with no entered threads.
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Record one enter by `thread`.
    ///
    /// `previous` is evaluated only when the thread has no entry yet.
    /// Returns the thread's entry count after the enter.
    pub fn enter(&mut self, thread: ThreadKey, previous: impl FnOnce() -> Option<P>) -> u32 {
        let entry = self.entries.entry(thread).or_insert_with(|| ThreadEntry {
            entry_count: 0,
            previous: previous(),
        });
        entry.entry_count += 1;
        entry.entry_count
    }

    /// Undo one enter by `thread`. `None` if the thread has not entered.
    pub fn exit(&mut self, thread: ThreadKey) -> Option<ExitOutcome<P>> {
        let entry = self.entries.get_mut(&thread)?;
        entry.entry_count -= 1;
        if entry.entry_count > 0 {
            return Some(ExitOutcome::Stayed {
                remaining: entry.entry_count,
            });
        }
        let entry = self.entries.shift_remove(&thread)?;
        Some(ExitOutcome::Left {
            previous: entry.previous,
        })
    }

    /// Point `thread`'s entry at a new predecessor after the old one left.
    ///
    /// Returns `false` if the thread has not entered.
    pub fn relink(&mut self, thread: ThreadKey, previous: Option<P>) -> bool {
        match self.entries.get_mut(&thread) {
            Some(entry) => {
                entry.previous = previous;
                true
            }
            None => false,
        }
    }

    /// The entry for `thread`, if it has entered.
    pub fn get(&self, thread: ThreadKey) -> Option<&ThreadEntry<P>> {
        self.entries.get(&thread)
    }

    /// Whether `thread` has entered.
    pub fn contains_thread(&self, thread: ThreadKey) -> bool {
        self.entries.contains_key(&thread)
    }

    /// Whether any thread has entered.
    pub fn contains_threads(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Number of entered threads.
    pub fn thread_count(&self) -> usize {
        self.entries.len()
    }

    /// Entered threads, in first-enter order.
    pub fn threads(&self) -> impl Iterator<Item = ThreadKey> + '_ {
        self.entries.keys().copied()
    }
}

impl<P> Default for IsolateThreadRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}
